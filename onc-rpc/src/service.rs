use bytes::BytesMut;
use onc_rpc_core::{xdr::Opaque, DispatchError, RpcProgram};
use tracing::debug;

use crate::protocol::{
    dispatch_test_version, DataResult, DataResultOther, MyStruct, ResultUnion, TestVersionService,
    FLOAT_RES, INT_RES, MAX_DATA, TEST_PROGRAM, TEST_VERSION,
};

/// Wraps on overflow.
pub fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

/// Wraps on overflow.
pub fn struct_mul_fields(arg: MyStruct) -> i32 {
    arg.x.wrapping_mul(arg.y)
}

pub fn struct_combine(x: i32, y: i32) -> MyStruct {
    MyStruct { x, y }
}

/// Picks the union arm for `discriminant`: 0 yields integer 1, 20 yields
/// float 1.0 and anything else the `-1` error arm.
pub fn union_test(discriminant: i32) -> ResultUnion {
    match discriminant {
        INT_RES => ResultUnion::IntRes(1),
        FLOAT_RES => ResultUnion::FloatRes(1.0),
        _ => ResultUnion::err(),
    }
}

/// Reads the active arm back as an integer. Floats are truncated toward
/// zero; every other discriminant, `-1` included, yields `-1`.
pub fn union_param(arg: ResultUnion) -> i32 {
    match arg {
        ResultUnion::IntRes(v) => v,
        ResultUnion::FloatRes(v) => v as i32,
        ResultUnion::Other(_) => -1,
    }
}

/// Returns `len` bytes counting up from 0 and wrapping at 256, or the `-1`
/// arm when `len` exceeds `MAX_DATA`.
pub fn fill_data(len: u32) -> DataResult {
    if len > MAX_DATA as u32 {
        return DataResult::Other(DataResultOther::ERR);
    }
    DataResult::Data(Opaque((0..len).map(|i| i as u8).collect()))
}

/// Server side of the test program.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestService;

impl TestVersionService for TestService {
    fn add(&self, a: i32, b: i32) -> i32 {
        add(a, b)
    }

    fn struct_mul_fields(&self, arg: MyStruct) -> i32 {
        struct_mul_fields(arg)
    }

    fn struct_combine(&self, x: i32, y: i32) -> MyStruct {
        struct_combine(x, y)
    }

    fn union_test(&self, discriminant: i32) -> ResultUnion {
        union_test(discriminant)
    }

    fn union_param(&self, arg: ResultUnion) -> i32 {
        union_param(arg)
    }

    fn fill_data(&self, len: u32) -> DataResult {
        fill_data(len)
    }
}

impl RpcProgram for TestService {
    fn program(&self) -> u32 {
        TEST_PROGRAM
    }

    fn version(&self) -> u32 {
        TEST_VERSION
    }

    fn dispatch(
        &self,
        procedure: u32,
        args: &[u8],
        results: &mut BytesMut,
    ) -> Result<(), DispatchError> {
        debug!(procedure, "dispatching");
        dispatch_test_version(self, procedure, args, results)
    }
}
