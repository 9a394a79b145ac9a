mod scenarios;

use crate::core::router::MessageRouter;
use crate::core::store::{ConsoleState, shared};

fn router() -> MessageRouter {
    MessageRouter::new(shared(ConsoleState::default()))
}

fn feed(router: &MessageRouter, frames: &[&str]) {
    for frame in frames {
        router.handle_frame(frame);
    }
}
