use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PipelineError};

/// An inference capability the external library can build a pipeline for.
///
/// Serialized as its canonical id; deserialized through [`FromStr`], aliases included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Task {
    TextClassification,
    TokenClassification,
    QuestionAnswering,
    FillMask,
    Summarization,
    Translation,
    TextGeneration,
    Text2TextGeneration,
    ZeroShotClassification,
    FeatureExtraction,
    ImageClassification,
    ImageToText,
    ObjectDetection,
    ImageSegmentation,
    ZeroShotImageClassification,
    DepthEstimation,
    AutomaticSpeechRecognition,
    AudioClassification,
    TextToAudio,
}

/// Kind of payload a [`Task`] consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl Task {
    pub const ALL: [Task; 19] = [
        Task::TextClassification,
        Task::TokenClassification,
        Task::QuestionAnswering,
        Task::FillMask,
        Task::Summarization,
        Task::Translation,
        Task::TextGeneration,
        Task::Text2TextGeneration,
        Task::ZeroShotClassification,
        Task::FeatureExtraction,
        Task::ImageClassification,
        Task::ImageToText,
        Task::ObjectDetection,
        Task::ImageSegmentation,
        Task::ZeroShotImageClassification,
        Task::DepthEstimation,
        Task::AutomaticSpeechRecognition,
        Task::AudioClassification,
        Task::TextToAudio,
    ];

    /// The canonical identifier, as understood by the inference library.
    pub fn id(&self) -> &'static str {
        match self {
            Task::TextClassification => "text-classification",
            Task::TokenClassification => "token-classification",
            Task::QuestionAnswering => "question-answering",
            Task::FillMask => "fill-mask",
            Task::Summarization => "summarization",
            Task::Translation => "translation",
            Task::TextGeneration => "text-generation",
            Task::Text2TextGeneration => "text2text-generation",
            Task::ZeroShotClassification => "zero-shot-classification",
            Task::FeatureExtraction => "feature-extraction",
            Task::ImageClassification => "image-classification",
            Task::ImageToText => "image-to-text",
            Task::ObjectDetection => "object-detection",
            Task::ImageSegmentation => "image-segmentation",
            Task::ZeroShotImageClassification => "zero-shot-image-classification",
            Task::DepthEstimation => "depth-estimation",
            Task::AutomaticSpeechRecognition => "automatic-speech-recognition",
            Task::AudioClassification => "audio-classification",
            Task::TextToAudio => "text-to-audio",
        }
    }

    /// The payload kind this task expects. Informational; inputs are never validated against it.
    pub fn modality(&self) -> Modality {
        match self {
            Task::ImageClassification
            | Task::ImageToText
            | Task::ObjectDetection
            | Task::ImageSegmentation
            | Task::ZeroShotImageClassification
            | Task::DepthEstimation => Modality::Image,
            Task::AutomaticSpeechRecognition | Task::AudioClassification => Modality::Audio,
            _ => Modality::Text,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Task {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().to_ascii_lowercase();
        let task = match id.as_str() {
            "sentiment-analysis" => Task::TextClassification,
            "ner" => Task::TokenClassification,
            "asr" => Task::AutomaticSpeechRecognition,
            "text-to-speech" => Task::TextToAudio,
            id => Task::ALL
                .into_iter()
                .find(|task| task.id() == id)
                .ok_or_else(|| {
                    PipelineError::new(ErrorKind::UnsupportedTask, format!("unsupported task: {s}"))
                })?,
        };
        Ok(task)
    }
}

impl TryFrom<String> for Task {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Task> for String {
    fn from(value: Task) -> Self {
        value.id().into()
    }
}

/// Execution device preference. The concrete backend is chosen by the inference library.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// Let the library decide.
    #[default]
    Auto,
    /// Accelerated execution (WebGPU).
    Gpu,
    /// CPU fallback (WASM).
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Gpu => write!(f, "webgpu"),
            Device::Cpu => write!(f, "wasm"),
        }
    }
}

impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "webgpu" | "gpu" => Ok(Device::Gpu),
            "wasm" | "cpu" => Ok(Device::Cpu),
            _ => Err(PipelineError::new(
                ErrorKind::InvalidConfig,
                format!("unknown device: {s}"),
            )),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(value: Device) -> Self {
        value.to_string()
    }
}

/// Options a session is created with. Any change to them starts a new session.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Model identifier overriding the library's default for the task.
    pub model: Option<String>,
    /// Where to run the model.
    pub device: Device,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, value: impl Into<String>) -> Self {
        self.model = Some(value.into());
        self
    }

    pub fn with_device(mut self, value: Device) -> Self {
        self.device = value;
        self
    }

    /// Parse a configuration document such as `{"model": "Xenova/gpt2", "device": "webgpu"}`.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|err| PipelineError::new(ErrorKind::InvalidConfig, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{Device, Modality, PipelineConfig, Task};
    use crate::error::ErrorKind;

    #[test]
    fn test_task_ids() -> Result<()> {
        for task in Task::ALL {
            assert_eq!(task.to_string().parse::<Task>()?, task);
            let json = serde_json::to_string(&task)?;
            assert_eq!(json, format!("\"{}\"", task.id()));
        }
        Ok(())
    }

    #[test]
    fn test_task_aliases() -> Result<()> {
        assert_eq!("sentiment-analysis".parse::<Task>()?, Task::TextClassification);
        assert_eq!(" NER ".parse::<Task>()?, Task::TokenClassification);
        assert_eq!(
            serde_json::from_str::<Task>("\"sentiment-analysis\"")?,
            Task::TextClassification
        );

        // serde accepts exactly what parsing accepts
        for (id, task) in [
            ("\"ASR\"", Task::AutomaticSpeechRecognition),
            ("\"text-to-speech\"", Task::TextToAudio),
            ("\" Text2Text-Generation \"", Task::Text2TextGeneration),
        ] {
            assert_eq!(serde_json::from_str::<Task>(id)?, task);
        }
        let err = serde_json::from_str::<Task>("\"image-to-3d\"").unwrap_err();
        assert!(err.to_string().contains("unsupported task: image-to-3d"));

        let err = "image-to-3d".parse::<Task>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedTask);
        Ok(())
    }

    #[test]
    fn test_modality() {
        assert_eq!(Task::TextGeneration.modality(), Modality::Text);
        assert_eq!(Task::DepthEstimation.modality(), Modality::Image);
        assert_eq!(Task::AutomaticSpeechRecognition.modality(), Modality::Audio);
    }

    #[test]
    fn test_config() -> Result<()> {
        let config = PipelineConfig::from_json(r#"{"model": "Xenova/gpt2", "device": "gpu"}"#)?;
        assert_eq!(
            config,
            PipelineConfig::new()
                .with_model("Xenova/gpt2")
                .with_device(Device::Gpu)
        );
        assert_eq!(PipelineConfig::from_json("{}")?, PipelineConfig::default());

        let err = PipelineConfig::from_json(r#"{"dtype": "q8"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        assert_eq!("CPU".parse::<Device>()?, Device::Cpu);
        assert_eq!(serde_json::to_string(&Device::Gpu)?, "\"webgpu\"");
        assert_eq!(serde_json::from_str::<Device>("\"WASM\"")?, Device::Cpu);
        assert!(PipelineConfig::from_json(r#"{"device": "tpu"}"#).is_err());
        Ok(())
    }
}
