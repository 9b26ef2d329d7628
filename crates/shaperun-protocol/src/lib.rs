//! Control-line protocol for shaperun workers.
//!
//! Every message is one UTF-8 line. A worker announces itself with `READY`
//! once its shape engine is warm, then answers exactly one response line per
//! request line until it reads `EXIT` or its input closes.
//!
//! Two request/response variants exist:
//!
//! - **path-pair**: `script|output` → `SUCCESS`, `SUCCESS|<MATERIAL>`, or an
//!   `ERROR:` / `EXCEPTION:` / `FATAL:` line with newlines flattened to `" || "`.
//! - **structured**: a JSON object `{codeFile, argsFile, outputPath}` →
//!   `OK`, `OK|<MATERIAL>` or `ERR`, with failure detail in `<outputPath>.err`.
//!
//! # Example
//!
//! ```rust
//! use shaperun_protocol::{StructuredRequest, StructuredResponse};
//!
//! let request = StructuredRequest::new("/ws/t1_code.txt", "/ws/t1_args.json", "/ws/t1.brep");
//! let line = request.encode().unwrap();
//! assert_eq!(StructuredRequest::decode(&line).unwrap(), request);
//!
//! let reply = StructuredResponse::decode("OK|STEEL").unwrap();
//! assert_eq!(reply, StructuredResponse::Ok { material: Some("STEEL".into()) });
//! ```

mod channel;
mod codec;
mod error;

pub use channel::LineChannel;
pub use codec::{
    flatten, sidecar_path, FailureKind, PathPairRequest, PathPairResponse, StructuredRequest,
    StructuredResponse, EXIT, FLATTEN_SEPARATOR, READY, SIDECAR_SUFFIX,
};
pub use error::ProtocolError;
