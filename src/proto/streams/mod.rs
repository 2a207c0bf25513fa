mod flow_control;
mod state;
mod store;
mod stream;
#[allow(clippy::module_inception)]
mod streams;

pub(crate) use self::streams::{Config, Streams};
pub use self::stream::Trailers;
