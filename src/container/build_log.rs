//! Build output decoding.
//!
//! The daemon reports builds as a stream of JSON messages. The legacy builder
//! sends plain text in `stream` (`Step 3/10 : RUN go build`), BuildKit sends
//! `moby.buildkit.trace` messages whose `aux` payload lists the vertices being
//! worked on. Both report failures through `error` / `errorDetail`.
//!
//! Each message is decoded once into a [`BuildEvent`], and [`BuildStepParser`]
//! reduces the event sequence to a single "current step" for display.

use bollard::models::BuildInfo;

/// One decoded build output message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Legacy builder output text
    Stream(String),
    /// BuildKit vertex names, in the order reported
    Trace(Vec<String>),
    /// Terminal build failure
    Error(String),
    /// Anything else (status, image id, empty aux)
    Other,
}

impl From<BuildInfo> for BuildEvent {
    #[allow(deprecated)]
    fn from(info: BuildInfo) -> Self {
        let detail = info
            .error_detail
            .and_then(|detail| detail.message)
            .filter(|message| !message.is_empty());
        if let Some(message) = detail.or(info.error) {
            return BuildEvent::Error(message);
        }

        if let Some(text) = info.stream {
            return BuildEvent::Stream(text);
        }

        #[cfg(feature = "buildkit")]
        if let Some(bollard::models::BuildInfoAux::BuildKit(status)) = info.aux {
            let names: Vec<String> = status
                .vertexes
                .into_iter()
                .map(|vertex| vertex.name)
                .filter(|name| !name.is_empty())
                .collect();
            if !names.is_empty() {
                return BuildEvent::Trace(names);
            }
        }

        BuildEvent::Other
    }
}

/// Reduces build events to the step currently being executed.
#[derive(Debug, Clone, Default)]
pub struct BuildStepParser {
    current: Option<String>,
}

impl BuildStepParser {
    /// Create a parser with no step seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one event.
    ///
    /// Returns the new current step when it changed, or the failure message
    /// for an error event.
    pub fn observe(&mut self, event: &BuildEvent) -> std::result::Result<Option<&str>, String> {
        let step = match event {
            BuildEvent::Error(message) => return Err(message.clone()),
            BuildEvent::Stream(text) => {
                let line = text.trim();
                if !line.starts_with("Step ") {
                    return Ok(None);
                }
                line.to_string()
            }
            // Most recent vertex wins
            BuildEvent::Trace(names) => match names.last() {
                Some(name) => name.trim().to_string(),
                None => return Ok(None),
            },
            BuildEvent::Other => return Ok(None),
        };

        if self.current.as_deref() == Some(step.as_str()) {
            return Ok(None);
        }
        self.current = Some(step);
        Ok(self.current.as_deref())
    }

    /// Last step seen.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}
