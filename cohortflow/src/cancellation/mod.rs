//! Cooperative cancellation shared by the tasks of a scope.

mod token;

pub use token::CancellationToken;
