//! Parameter helpers for MAAS CLI calls
//!
//! MAAS takes positional ids followed by `key=value` pairs; repeated keys are
//! how list parameters (MAC addresses, partitions) are passed.

/// Builder for a MAAS CLI argument list
#[derive(Debug, Default, Clone)]
pub struct Params {
    args: Vec<String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional argument (system id, device id, ...)
    pub fn id(mut self, id: impl ToString) -> Self {
        self.args.push(id.to_string());
        self
    }

    /// `key=value` parameter
    pub fn kv(mut self, key: &str, value: impl ToString) -> Self {
        self.args.push(format!("{}={}", key, value.to_string()));
        self
    }

    /// `key=value` parameter, skipped when the value is absent
    pub fn kv_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.kv(key, value),
            None => self,
        }
    }

    /// One `key=value` pair per item
    pub fn repeated<V: ToString>(mut self, key: &str, values: &[V]) -> Self {
        for value in values {
            self.args.push(format!("{}={}", key, value.to_string()));
        }
        self
    }

    pub fn build(self) -> Vec<String> {
        self.args
    }
}
