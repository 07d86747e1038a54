//! Runtime configuration for the synchronizer.

use std::time::Duration;

/// Everything the synchronizer needs to know, provided by the caller.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Glob pattern selecting the files to upload
    pub pattern: String,
    /// Destination bucket
    pub bucket: String,
    /// Key prefix inside the bucket, stored without surrounding slashes
    pub bucket_path: String,
    /// Pause between scan iterations
    pub scan_interval: Duration,
}

impl UploaderConfig {
    pub fn new(
        pattern: impl Into<String>,
        bucket: impl Into<String>,
        bucket_path: &str,
        scan_interval: Duration,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            bucket: bucket.into(),
            bucket_path: bucket_path
                .trim_start_matches('/')
                .trim_end_matches('/')
                .to_string(),
            scan_interval,
        }
    }

    /// Name of the data stream carrying upload tasks for this bucket.
    pub fn stream_name(&self) -> String {
        format!("{}Stream", self.bucket)
    }

    /// Name of the companion status stream.
    pub fn status_stream_name(&self) -> String {
        format!("{}Status", self.stream_name())
    }

    /// Pause between status polls. Floored at one second so a fast scan
    /// interval does not turn status polling into a busy loop.
    pub fn status_interval(&self) -> Duration {
        self.scan_interval.max(Duration::from_secs(1))
    }

    /// Destination key for one file: `<prefix>/<file name>`.
    pub fn object_key(&self, file_name: &str) -> String {
        format!("{}/{}", self.bucket_path, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_path_is_trimmed() {
        let config = UploaderConfig::new("/tmp/*.csv", "bucket", "/logs/daily/", Duration::from_secs(5));
        assert_eq!(config.bucket_path, "logs/daily");
        assert_eq!(config.object_key("a.csv"), "logs/daily/a.csv");
    }

    #[test]
    fn stream_names_derive_from_bucket() {
        let config = UploaderConfig::new("/tmp/*.csv", "telemetry", "", Duration::from_secs(5));
        assert_eq!(config.stream_name(), "telemetryStream");
        assert_eq!(config.status_stream_name(), "telemetryStreamStatus");
    }

    #[test]
    fn status_interval_has_a_floor() {
        let fast = UploaderConfig::new("/tmp/*.csv", "b", "", Duration::from_millis(200));
        assert_eq!(fast.status_interval(), Duration::from_secs(1));

        let slow = UploaderConfig::new("/tmp/*.csv", "b", "", Duration::from_secs(30));
        assert_eq!(slow.status_interval(), Duration::from_secs(30));
    }
}
