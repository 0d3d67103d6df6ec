//! Positional argument parsing.
//!
//! Each RPC carries a CBOR array whose layout depends on the opcode. Integers
//! of any wire width are accepted and normalised; optional slots are `null`.

use ciborium::Value;
use splitd_core::{Attributes, RegisterFlags};
use thiserror::Error;

use super::attributes::sanitize_attributes;
use super::envelope::{OpCode, RpcEnvelope};

/// Why an RPC's arguments could not be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("opcode mismatch: expected one of {expected:02x?}, got {actual:#04x}")]
    OpCodeMismatch { expected: Vec<u8>, actual: u8 },

    #[error("wrong argument count: expected {expected}, got {actual}")]
    WrongArgCount { expected: usize, actual: usize },

    #[error("argument {index} is not {expected}")]
    InvalidArgType { index: usize, expected: &'static str },
}

type ArgResult<T> = Result<T, ArgError>;

/// Typed view of an RPC's arguments.
pub trait FromRpc: Sized {
    /// Opcodes whose arguments have this layout.
    const OPCODES: &'static [OpCode];
    /// Exact number of positional arguments.
    const ARG_COUNT: usize;

    /// Parse already count-checked arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ArgError::InvalidArgType`] for the first mismatching slot.
    fn from_args(args: &[Value]) -> ArgResult<Self>;

    /// Check the opcode and argument count, then parse.
    ///
    /// # Errors
    ///
    /// Returns the first [`ArgError`] found.
    fn from_rpc(rpc: &RpcEnvelope) -> ArgResult<Self> {
        if !Self::OPCODES.iter().any(|op| op.as_u8() == rpc.opcode) {
            return Err(ArgError::OpCodeMismatch {
                expected: Self::OPCODES.iter().map(|op| op.as_u8()).collect(),
                actual: rpc.opcode,
            });
        }
        if rpc.args.len() != Self::ARG_COUNT {
            return Err(ArgError::WrongArgCount {
                expected: Self::ARG_COUNT,
                actual: rpc.args.len(),
            });
        }
        Self::from_args(&rpc.args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterArgs {
    pub id: String,
    pub sdk_version: String,
    pub flags: RegisterFlags,
}

impl FromRpc for RegisterArgs {
    const OPCODES: &'static [OpCode] = &[OpCode::Register];
    const ARG_COUNT: usize = 3;

    fn from_args(args: &[Value]) -> ArgResult<Self> {
        Ok(Self {
            id: string_arg(args, 0)?,
            sdk_version: string_arg(args, 1)?,
            flags: RegisterFlags::from_bits(unsigned_arg(args, 2)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentArgs {
    pub key: String,
    pub bucketing_key: Option<String>,
    pub feature: String,
    pub attributes: Option<Attributes>,
}

impl FromRpc for TreatmentArgs {
    const OPCODES: &'static [OpCode] = &[OpCode::Treatment, OpCode::TreatmentWithConfig];
    const ARG_COUNT: usize = 4;

    fn from_args(args: &[Value]) -> ArgResult<Self> {
        Ok(Self {
            key: string_arg(args, 0)?,
            bucketing_key: optional_string_arg(args, 1)?,
            feature: string_arg(args, 2)?,
            attributes: optional_attributes_arg(args, 3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentsArgs {
    pub key: String,
    pub bucketing_key: Option<String>,
    pub features: Vec<String>,
    pub attributes: Option<Attributes>,
}

impl FromRpc for TreatmentsArgs {
    const OPCODES: &'static [OpCode] = &[OpCode::Treatments, OpCode::TreatmentsWithConfig];
    const ARG_COUNT: usize = 4;

    fn from_args(args: &[Value]) -> ArgResult<Self> {
        Ok(Self {
            key: string_arg(args, 0)?,
            bucketing_key: optional_string_arg(args, 1)?,
            features: string_list_arg(args, 2)?,
            attributes: optional_attributes_arg(args, 3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackArgs {
    pub key: String,
    pub traffic_type: String,
    pub event_type: String,
    pub value: Option<f64>,
    pub properties: Option<Attributes>,
    pub timestamp: i64,
}

impl FromRpc for TrackArgs {
    const OPCODES: &'static [OpCode] = &[OpCode::Track];
    const ARG_COUNT: usize = 6;

    fn from_args(args: &[Value]) -> ArgResult<Self> {
        Ok(Self {
            key: string_arg(args, 0)?,
            traffic_type: string_arg(args, 1)?,
            event_type: string_arg(args, 2)?,
            value: optional_float_arg(args, 3)?,
            properties: optional_attributes_arg(args, 4)?,
            timestamp: integer_arg(args, 5)?,
        })
    }
}

/// Argument layout of the introspection calls that take nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoArgs;

impl FromRpc for NoArgs {
    const OPCODES: &'static [OpCode] = &[OpCode::SplitNames, OpCode::Splits];
    const ARG_COUNT: usize = 0;

    fn from_args(_args: &[Value]) -> ArgResult<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitArgs {
    pub name: String,
}

impl FromRpc for SplitArgs {
    const OPCODES: &'static [OpCode] = &[OpCode::Split];
    const ARG_COUNT: usize = 1;

    fn from_args(args: &[Value]) -> ArgResult<Self> {
        Ok(Self {
            name: string_arg(args, 0)?,
        })
    }
}

fn arg<'a>(args: &'a [Value], index: usize, expected: &'static str) -> ArgResult<&'a Value> {
    args.get(index)
        .ok_or(ArgError::InvalidArgType { index, expected })
}

fn string_arg(args: &[Value], index: usize) -> ArgResult<String> {
    const EXPECTED: &str = "a string";
    match arg(args, index, EXPECTED)? {
        Value::Text(s) => Ok(s.clone()),
        _ => Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
    }
}

fn optional_string_arg(args: &[Value], index: usize) -> ArgResult<Option<String>> {
    const EXPECTED: &str = "a string or null";
    match arg(args, index, EXPECTED)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s.clone())),
        _ => Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
    }
}

fn integer_arg(args: &[Value], index: usize) -> ArgResult<i64> {
    const EXPECTED: &str = "a signed 64-bit integer";
    match arg(args, index, EXPECTED)? {
        Value::Integer(i) => i64::try_from(*i).map_err(|_| ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
        _ => Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
    }
}

fn unsigned_arg(args: &[Value], index: usize) -> ArgResult<u64> {
    const EXPECTED: &str = "an unsigned 64-bit integer";
    match arg(args, index, EXPECTED)? {
        Value::Integer(i) => u64::try_from(*i).map_err(|_| ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
        _ => Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
    }
}

#[allow(clippy::cast_precision_loss)]
fn optional_float_arg(args: &[Value], index: usize) -> ArgResult<Option<f64>> {
    const EXPECTED: &str = "a number or null";
    match arg(args, index, EXPECTED)? {
        Value::Null => Ok(None),
        Value::Float(f) => Ok(Some(*f)),
        Value::Integer(i) => Ok(Some(i128::from(*i) as f64)),
        _ => Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
    }
}

fn string_list_arg(args: &[Value], index: usize) -> ArgResult<Vec<String>> {
    const EXPECTED: &str = "a list of strings";
    let Value::Array(items) = arg(args, index, EXPECTED)? else {
        return Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        });
    };
    items
        .iter()
        .map(|item| match item {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(ArgError::InvalidArgType {
                index,
                expected: EXPECTED,
            }),
        })
        .collect()
}

fn optional_attributes_arg(args: &[Value], index: usize) -> ArgResult<Option<Attributes>> {
    const EXPECTED: &str = "a map or null";
    match arg(args, index, EXPECTED)? {
        Value::Null => Ok(None),
        Value::Map(entries) => Ok(Some(sanitize_attributes(entries))),
        _ => Err(ArgError::InvalidArgType {
            index,
            expected: EXPECTED,
        }),
    }
}
