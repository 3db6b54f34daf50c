//! Encoding of the initializer call a proxy is constructed with
//!
//! Arguments are checked against the implementation ABI before encoding, so a malformed
//! declaration is rejected before any transaction is sent.

use std::fmt::{self, Display};

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt},
    json_abi::{JsonAbi, Param},
};
use alloy_primitives::{Address, Bytes, U256};
use itertools::Itertools;

use crate::{constants::DEFAULT_INITIALIZER, errors::ScriptError};

/// The solidity type name of a tuple parameter
const TUPLE_TYPE: &str = "tuple";

/// A single initializer argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitArg {
    /// An address, also accepted for contract-typed parameters
    Address(Address),
    /// An unsigned integer, narrowed to the parameter's width
    Uint(U256),
    /// A boolean
    Bool(bool),
    /// A string
    String(String),
    /// A struct, with its fields named as in the ABI
    Struct(Vec<(String, InitArg)>),
}

impl InitArg {
    /// Build a struct argument from named fields
    pub fn structure<'a>(fields: impl IntoIterator<Item = (&'a str, InitArg)>) -> Self {
        InitArg::Struct(
            fields
                .into_iter()
                .map(|(name, arg)| (name.to_string(), arg))
                .collect(),
        )
    }

    /// Build an integer argument
    pub fn uint(value: u64) -> Self {
        InitArg::Uint(U256::from(value))
    }
}

impl Display for InitArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitArg::Address(address) => write!(f, "{:#x}", address),
            InitArg::Uint(value) => write!(f, "{}", value),
            InitArg::Bool(value) => write!(f, "{}", value),
            InitArg::String(value) => write!(f, "{:?}", value),
            InitArg::Struct(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|(name, arg)| format!("{}: {}", name, arg))
                    .join(", ")
            ),
        }
    }
}

/// The initializer method and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initializer {
    /// The method invoked through the proxy
    pub method: String,
    /// The arguments, in declaration order
    pub args: Vec<InitArg>,
}

impl Initializer {
    /// Call the default `initialize` method with `args`
    pub fn new(args: Vec<InitArg>) -> Self {
        Self::with_method(DEFAULT_INITIALIZER, args)
    }

    /// Call a custom initializer method with `args`
    pub fn with_method(method: &str, args: Vec<InitArg>) -> Self {
        Self {
            method: method.to_string(),
            args,
        }
    }

    /// Encode the call against `abi`, validating arity and argument types
    pub fn encode(&self, abi: &JsonAbi) -> Result<Bytes, ScriptError> {
        let overloads = abi.function(&self.method).ok_or_else(|| {
            ScriptError::CalldataConstruction(format!("no method named {}", self.method))
        })?;

        let mut candidates = overloads
            .iter()
            .filter(|function| function.inputs.len() == self.args.len());
        let function = match (candidates.next(), candidates.next()) {
            (Some(function), None) => function,
            (None, _) => {
                return Err(ScriptError::CalldataConstruction(format!(
                    "{} takes {} arguments, {} given",
                    self.method,
                    overloads.iter().map(|f| f.inputs.len()).join(" or "),
                    self.args.len()
                )))
            }
            (Some(_), Some(_)) => {
                return Err(ScriptError::CalldataConstruction(format!(
                    "{} is overloaded with {} arguments",
                    self.method,
                    self.args.len()
                )))
            }
        };

        let values = function
            .inputs
            .iter()
            .zip(&self.args)
            .map(|(param, arg)| resolve_arg(param, arg))
            .collect::<Result<Vec<_>, _>>()?;

        function
            .abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| ScriptError::CalldataConstruction(format!("{}: {}", self.method, e)))
    }
}

/// Convert an argument to the dynamic value expected by `param`
fn resolve_arg(param: &Param, arg: &InitArg) -> Result<DynSolValue, ScriptError> {
    let mismatch = |expected: &str| {
        ScriptError::CalldataConstruction(format!(
            "argument {}: expected {}, got {}",
            param.name, expected, arg
        ))
    };

    if let InitArg::Struct(fields) = arg {
        if param.ty != TUPLE_TYPE {
            return Err(mismatch(&param.ty));
        }
        if fields.len() != param.components.len() {
            return Err(ScriptError::CalldataConstruction(format!(
                "argument {}: expected fields {}",
                param.name,
                param.components.iter().map(|c| &c.name).join(", ")
            )));
        }

        let values = param
            .components
            .iter()
            .map(|component| {
                let (_, value) = fields
                    .iter()
                    .find(|(name, _)| name == &component.name)
                    .ok_or_else(|| {
                        ScriptError::CalldataConstruction(format!(
                            "argument {}: missing field {}",
                            param.name, component.name
                        ))
                    })?;
                resolve_arg(component, value)
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(DynSolValue::Tuple(values));
    }

    let ty = DynSolType::parse(&param.ty)
        .map_err(|e| ScriptError::CalldataConstruction(format!("{}: {}", param.ty, e)))?;
    match (&ty, arg) {
        (DynSolType::Address, InitArg::Address(address)) => Ok(DynSolValue::Address(*address)),
        (DynSolType::Bool, InitArg::Bool(value)) => Ok(DynSolValue::Bool(*value)),
        (DynSolType::String, InitArg::String(value)) => Ok(DynSolValue::String(value.clone())),
        (DynSolType::Uint(bits), InitArg::Uint(value)) => {
            if value.bit_len() > *bits {
                return Err(ScriptError::CalldataConstruction(format!(
                    "argument {}: {} does not fit in {}",
                    param.name, value, param.ty
                )));
            }
            Ok(DynSolValue::Uint(*value, *bits))
        }
        _ => Err(mismatch(&param.ty)),
    }
}
