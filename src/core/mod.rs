pub mod cancel;
pub mod event_bus;
pub mod executor;
pub mod poller;
pub mod retry;
pub mod runtime_context;

pub use cancel::CancelSignal;
pub use event_bus::{create_event_channel, EventReceiver, EventSender, ExecutorEvent};
pub use executor::JobGraphExecutor;
pub use poller::{PollSchedule, PollTick};
pub use retry::{calculate_retry_interval, submit_with_retry, SubmitFailure};
pub use runtime_context::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, RealIdGenerator, RealTimeProvider,
    RuntimeContext, TimeProvider,
};
