/// Backend-reported activity flags carried by `status` events.
///
/// Every flag is optional on the wire; absent flags read as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recognizing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synthesizing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    degraded: Option<bool>,
}

impl StatusFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recognizing(mut self, recognizing: bool) -> Self {
        self.recognizing = Some(recognizing);
        self
    }

    pub fn with_synthesizing(mut self, synthesizing: bool) -> Self {
        self.synthesizing = Some(synthesizing);
        self
    }

    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = Some(degraded);
        self
    }

    pub fn recognizing(&self) -> bool {
        self.recognizing.unwrap_or(false)
    }

    pub fn synthesizing(&self) -> bool {
        self.synthesizing.unwrap_or(false)
    }

    pub fn degraded(&self) -> bool {
        self.degraded.unwrap_or(false)
    }
}
