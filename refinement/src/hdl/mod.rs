//! HDL source handling
//!
//! Lexical-level helpers for generated Verilog/SystemVerilog. Nothing here
//! parses the language; every check works on keywords, delimiters and
//! identifier boundaries.
//!
//! ```text
//! response ─► extractor ─► structural ─► (compile) ─► ports
//! ```

pub mod extractor;
pub mod ports;
pub mod structural;
pub mod text;

pub use extractor::{extract, Extraction, ExtractionStrategy};
pub use ports::{analyze_ports, Direction, PortSignature, PortUsage, PortUsageResult};
pub use structural::{validate_structure, CheckOutcome, StructuralCheck, StructuralReport};
pub use text::module_name;
