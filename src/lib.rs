//! weft: a model-to-text transformation engine for the OMG MOFM2T / Acceleo
//! dialect of MTL.
//!
//! Template source interleaves literal text with `[ ... ]` directives carrying
//! an AQL/OCL-like expression language. Parsing produces an immutable
//! [`Module`](ast::Module); a generation run walks a template's statements
//! against an execution context and commits output through a pluggable
//! [`OutputStrategy`](strategy::OutputStrategy). Regions of previously
//! generated files delimited by protected-area markers survive regeneration.
//!
//! ```
//! use std::sync::Arc;
//! use weft::strategy::InMemoryStrategy;
//!
//! let module = weft::parse("[module m('u')][template t()]Hello[/template]").unwrap();
//! let strategy = Arc::new(InMemoryStrategy::new());
//! let result = weft::generate(module, Default::default(), strategy).unwrap();
//! assert_eq!(result.stdout, "Hello");
//! ```

pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod indent;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod protect;
pub mod strategy;
pub mod token;
pub mod validate;
pub mod value;
pub mod writer;

use std::sync::Arc;

pub use ast::Module;
pub use error::{ExecError, ParseError, WeftError};
pub use interpreter::{GenerateOptions, GenerationResult, GenerationStats, Interpreter};
pub use value::{ModelResource, Value};

/// Parse template source into a module.
pub fn parse(source: &str) -> Result<Module, ParseError> {
    parser::parse_module(source)
}

/// Run a generation: execute the module's main template (or the one named in
/// the options) against the given output strategy.
pub fn generate(
    module: Module,
    options: GenerateOptions,
    strategy: Arc<dyn strategy::OutputStrategy>,
) -> Result<GenerationResult, ExecError> {
    Interpreter::new(module, options, strategy).run()
}
