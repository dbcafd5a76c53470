//! Acquisition engine: the event-stream parser, the poll, stream and weather
//! loops, and the dispatcher that runs them side by side.

mod dispatcher;
mod lines;
mod parser;
mod poll;
mod sink;
mod stream;
mod weather;

pub use dispatcher::DispatchReport;
pub use dispatcher::Dispatcher;
pub use dispatcher::LoopOutcome;
pub use lines::LineReader;
pub use lines::MAX_LINE_LENGTH;
pub use parser::EventParser;
pub use parser::StreamEvent;
pub use parser::KEEP_ALIVE;
pub use poll::PollError;
pub use poll::PollLoop;
pub use sink::channel;
pub use sink::Payload;
pub use sink::Sink;
pub use sink::SinkClosed;
pub use sink::Source;
pub use sink::Update;
pub use sink::UpdateReceiver;
pub use sink::UpdateSender;
pub use sink::DEFAULT_CAPACITY;
pub use stream::StreamError;
pub use stream::StreamExit;
pub use stream::StreamLoop;
pub use stream::StreamSettings;
pub use weather::WeatherLoop;
