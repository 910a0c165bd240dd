//! SOAP object model, decoder, encoder and faults.

mod decode;
mod encode;
pub mod fault;
pub mod model;
pub mod names;

pub use decode::{SOAP_MAX_STACKSIZE, decode, unescape};
pub use encode::{SOAP_MAX_MSG_SIZE, encode, encoded_len};
pub use fault::{Fault, FaultCode, FaultSubcode};
pub use model::{Element, ElementId, Message, Namespace, NsId, ParamNs, Parameter};
