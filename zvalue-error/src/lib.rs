//! Ошибки кодеков `zvalue`: [`StackError`] с кодом и следом заметок,
//! таксономия разбора, потоков, потребителя и сжатия.

pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

pub use ext::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

pub type ZvResult<T> = Result<T, StackError>;
