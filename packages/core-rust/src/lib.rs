//! `ConvenientService` Core: JSend results, dynamic values, call arguments and matchers.

pub mod arguments;
pub mod matcher;
pub mod origin;
pub mod result;
pub mod value;

pub use arguments::{Arguments, Block};
pub use matcher::{DataMode, DataPattern, Expect, Matcher, ResultPattern};
pub use origin::{ServiceRef, StepRef};
pub use result::{
    Code, Data, Message, ResultBuilder, ResultError, ResultOverrides, ServiceResult, Status,
};
pub use value::Value;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
