//! # Signature
//!
//! A resolved function declaration that is eligible for a stub

use crate::convention::CallingConvention;

/// Function signature with a known fixed address
///
/// Every argument is treated as a single 32-bit word, so only the parameter names and their order
/// matter; the names are used for annotations only and may repeat or be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Symbol name exposed by the stub
    pub name: String,
    /// Parameter names in declaration order (argument 1 first)
    pub parameters: Vec<String>,
    /// Convention the function is called with
    pub convention: CallingConvention,
    /// Address of the function in the target image
    pub address: u32,
}

impl SignatureRecord {
    /// Creates a new signature record
    pub fn new<N, P, S>(name: N, parameters: P, convention: CallingConvention, address: u32) -> Self
    where
        N: Into<String>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            convention,
            address,
        }
    }
}
