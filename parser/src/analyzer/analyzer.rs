use crate::packet::Frame;
use crate::state::ReplayState;

/// Consumes decoded frames. `state` already reflects `frame`.
pub trait Analyzer {
    fn process(&mut self, frame: &Frame, state: &dyn ReplayState);
    fn finish(&mut self);
}
