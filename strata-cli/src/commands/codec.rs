//! Codec command - show how names are stored under a path codec

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use strata_core::path::PathCodec;

use crate::output::{Output, OutputFormat, TableDisplay, TableOutput};
use crate::CodecAction;

#[derive(Debug, Clone, Serialize)]
pub struct CodecResult {
    pub codec: &'static str,
    pub action: &'static str,
    pub input: String,
    pub output: String,
}

impl CodecResult {
    pub fn apply(action: &CodecAction, codec: PathCodec) -> Self {
        let (action, input, output) = match action {
            CodecAction::Encode { name } => ("encode", name.clone(), codec.encode(name)),
            CodecAction::Decode { name } => ("decode", name.clone(), codec.decode(name)),
        };
        Self {
            codec: codec.as_str(),
            action,
            input,
            output,
        }
    }
}

impl TableDisplay for CodecResult {
    fn to_table(&self) -> String {
        let table = TableOutput::format_key_value(&[
            ("Input", self.input.clone()),
            ("Output", self.output.clone()),
        ]);
        format!(
            "{} ({})\n{}",
            self.action.cyan().bold(),
            self.codec,
            table
        )
    }
}

pub fn run(action: CodecAction, codec: PathCodec, format: OutputFormat) -> Result<()> {
    Output::new(CodecResult::apply(&action, codec), format).render()
}
