use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, cfg: &socload_core::RunConfig, registry: &socload_core::TrafficRegistry);
    fn progress(&self) -> Option<socload_core::ProgressFn>;
    fn print_summary(&self, merged: &socload_core::MergedSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat, headless: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new(headless)),
        OutputFormat::Json => Box::new(json::JsonOutput::new(headless)),
    }
}
