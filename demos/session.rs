use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};
use web_pipeline::{FnHandle, FnLoader, Pipeline, PipelineConfig, Task};

const POSITIVE: &[&str] = &["good", "great", "love", "excellent", "nice", "happy"];
const NEGATIVE: &[&str] = &["bad", "awful", "hate", "terrible", "sad", "poor"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Device {
    #[default]
    Auto,
    Gpu,
    Cpu,
}

impl From<Device> for web_pipeline::Device {
    fn from(value: Device) -> Self {
        match value {
            Device::Auto => Self::Auto,
            Device::Gpu => Self::Gpu,
            Device::Cpu => Self::Cpu,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Texts to classify.
    #[arg(required = true)]
    inputs: Vec<String>,
    #[arg(short, long, default_value = "sentiment-analysis")]
    task: Task,
    #[arg(short, long)]
    model: Option<String>,
    #[arg(short, long, value_enum, default_value_t)]
    device: Device,
    /// Simulated model download time in milliseconds. Zero behaves like a cache hit.
    #[arg(long, default_value_t = 200)]
    delay: u64,
    /// Switch to this task while the first load is still in flight.
    #[arg(long)]
    switch: Option<Task>,
}

/// Scores text by counting words from two tiny lexicons.
fn classify(text: &str) -> Value {
    let words = text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .collect::<Vec<_>>();
    let count = |lexicon: &[&str]| words.iter().filter(|w| lexicon.contains(&w.as_str())).count();
    let (pos, neg) = (count(POSITIVE), count(NEGATIVE));
    let total = (pos + neg).max(1) as f64;
    let (label, score) = match pos >= neg {
        true => ("POSITIVE", (pos as f64 + 1.0) / (total + 1.0)),
        false => ("NEGATIVE", (neg as f64 + 1.0) / (total + 1.0)),
    };
    json!([{ "label": label, "score": score }])
}

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .with_module_level("web_pipeline", log::LevelFilter::Info)
        .with_module_level("session", log::LevelFilter::Info)
        .init()?;
    let cli = Cli::parse();

    let delay = Duration::from_millis(cli.delay);
    let loader = FnLoader::new(move |task: Task, config: PipelineConfig| async move {
        tokio::time::sleep(delay).await;
        if task != Task::TextClassification {
            bail!("no stub model for {task}");
        }
        if let Some(model) = config.model.filter(|model| !model.contains("sst-2")) {
            bail!("could not locate file for {model}");
        }
        anyhow::Ok(FnHandle::new(|text: String| async move {
            if text.is_empty() {
                bail!("empty input");
            }
            anyhow::Ok(classify(&text))
        }))
    });

    let mut config = PipelineConfig::new().with_device(cli.device.into());
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }

    let pipeline = Pipeline::new(loader, cli.task, config.clone()).await;
    log::info!("session {}: {}", pipeline.session(), pipeline.status());

    if let Some(task) = cli.switch {
        pipeline.configure(task, config).await;
        log::info!("session {}: {}", pipeline.session(), pipeline.status());
    }

    let state = pipeline.wait_for(|state| !state.loading()).await;
    if let Some(err) = state.error() {
        log::error!("{:?}: {err}", err.kind());
        return Ok(());
    }

    for input in cli.inputs {
        pipeline.run(input.clone()).await;
        match (pipeline.error(), pipeline.output()) {
            (Some(err), _) => println!("{input:?} => error ({:?}): {err}", err.kind()),
            (None, Some(output)) => println!("{input:?} => {output}"),
            (None, None) => println!("{input:?} => nothing"),
        }
        pipeline.reset().await;
    }

    Ok(())
}
