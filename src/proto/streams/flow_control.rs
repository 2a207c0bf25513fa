use crate::frame::Reason;
use crate::proto::{WindowSize, MAX_WINDOW_SIZE};

/// A signed flow-control window.
///
/// Windows go negative when the peer shrinks INITIAL_WINDOW_SIZE while data
/// is in flight, so the size is tracked as an `i32` per RFC 7540 § 6.9.2.
#[derive(Copy, Clone, Debug)]
pub struct FlowControl {
    window_size: i32,
}

impl FlowControl {
    pub fn new(initial: WindowSize) -> FlowControl {
        debug_assert!(initial <= MAX_WINDOW_SIZE);
        FlowControl {
            window_size: initial as i32,
        }
    }

    /// The current window. Negative means the peer shrank the initial
    /// window below what is already in flight.
    pub fn window_size(&self) -> i32 {
        self.window_size
    }

    /// Window capacity currently available for sending.
    pub fn available(&self) -> WindowSize {
        if self.window_size < 0 {
            0
        } else {
            self.window_size as WindowSize
        }
    }

    /// Grow the window after a WINDOW_UPDATE.
    ///
    /// A growth past 2^31-1 is a flow-control violation at the scope of
    /// this window.
    pub fn inc_window(&mut self, sz: u32) -> Result<(), Reason> {
        let (val, overflow) = self.window_size.overflowing_add(sz as i32);

        if overflow || val > MAX_WINDOW_SIZE as i32 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        self.window_size = val;
        Ok(())
    }

    /// Consume window capacity for data being sent.
    ///
    /// The caller must have checked `available()` first.
    pub fn send_data(&mut self, sz: u32) {
        debug_assert!(sz <= self.available());
        self.window_size -= sz as i32;
    }

    /// Consume window capacity for data received from the peer.
    ///
    /// Receiving more than the advertised window is a flow-control
    /// violation by the peer.
    pub fn recv_data(&mut self, sz: u32) -> Result<(), Reason> {
        if (sz as i32) > self.window_size {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        self.window_size -= sz as i32;
        Ok(())
    }

    /// Apply a retroactive INITIAL_WINDOW_SIZE delta (RFC 7540 § 6.9.2).
    pub fn adjust_initial(&mut self, delta: i32) -> Result<(), Reason> {
        let (val, overflow) = self.window_size.overflowing_add(delta);

        if overflow || val > MAX_WINDOW_SIZE as i32 {
            return Err(Reason::FLOW_CONTROL_ERROR);
        }

        self.window_size = val;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_and_update_balance() {
        let mut flow = FlowControl::new(100);
        flow.send_data(40);
        assert_eq!(flow.window_size(), 60);
        flow.inc_window(40).unwrap();
        assert_eq!(flow.window_size(), 100);
    }

    #[test]
    fn overflow_is_a_flow_control_error() {
        let mut flow = FlowControl::new(MAX_WINDOW_SIZE);
        assert_eq!(flow.inc_window(1), Err(Reason::FLOW_CONTROL_ERROR));
    }

    #[test]
    fn peer_overrun_is_detected() {
        let mut flow = FlowControl::new(10);
        assert!(flow.recv_data(10).is_ok());
        assert_eq!(flow.recv_data(1), Err(Reason::FLOW_CONTROL_ERROR));
    }

    #[test]
    fn initial_window_shrink_can_go_negative() {
        let mut flow = FlowControl::new(100);
        flow.send_data(80);
        flow.adjust_initial(-90).unwrap();
        assert_eq!(flow.window_size(), -70);
        assert_eq!(flow.available(), 0);
    }
}
