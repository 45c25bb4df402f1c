mod invoker;
mod retry;
mod round;

pub use invoker::Invoker;
pub use round::run_round;
