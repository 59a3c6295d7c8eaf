//! Wire types of the test program, generated from `rpcl/test.x`.
//!
//! ```text
//! union ResultUnion switch (int err) {
//!     case INT_RES:   int int_res;
//!     case FLOAT_RES: float float_res;
//!     default:        void;
//! };
//! ```
//!
//! [`ResultUnionOther`] holds the discriminants of the `default` arm and
//! refuses 0 and 20, so a [`ResultUnion`] never pairs a known discriminant
//! with the wrong arm.

include!(concat!(env!("OUT_DIR"), "/test_x.rs"));

impl ResultUnionOther {
    pub const ERR: Self = Self(ERR_RES);
}

impl DataResultOther {
    pub const ERR: Self = Self(ERR_RES);
}

/// The value carried by a [`ResultUnion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Int(i32),
    Float(f32),
}

impl ResultUnion {
    pub fn err() -> Self {
        ResultUnion::Other(ResultUnionOther::ERR)
    }

    /// The default arm is void on the wire and reads as integer 0.
    pub fn payload(&self) -> Payload {
        match *self {
            ResultUnion::IntRes(v) => Payload::Int(v),
            ResultUnion::FloatRes(v) => Payload::Float(v),
            ResultUnion::Other(_) => Payload::Int(0),
        }
    }
}
