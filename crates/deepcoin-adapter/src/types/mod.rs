/*
[INPUT]:  Deepcoin topic identifiers and REST schema definitions
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions shared by ws and http layers
[UPDATE]: When API schema changes or new types added
*/

pub mod enums;
pub mod responses;

pub use enums::*;
pub use responses::*;
