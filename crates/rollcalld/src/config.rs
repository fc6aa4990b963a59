use rollcall_core::RecognitionConfig;
use rollcall_store::config::env_or;
use rollcall_store::{ConfigError, ConfigFile, DatabaseConfig};
use serde::Deserialize;
use std::time::Duration;

/// `[camera]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 device path.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Frames discarded after opening (camera AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            warmup_frames: 4,
        }
    }
}

/// `[attendance]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// A record marked less than this long ago is not marked again.
    pub cooldown_secs: u64,
    /// Recognition events buffered between the engine thread and the updater.
    pub queue_capacity: usize,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 30,
            queue_capacity: 16,
        }
    }
}

impl AttendanceConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Station configuration: config file sections overridden by `ROLLCALL_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub recognition: RecognitionConfig,
    pub attendance: AttendanceConfig,
    pub database: DatabaseConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(&ConfigFile::discover()?)
    }

    pub fn from_file(file: &ConfigFile) -> Result<Self, ConfigError> {
        let mut camera: CameraConfig = file.section("camera")?;
        if let Ok(device) = std::env::var("ROLLCALL_CAMERA_DEVICE") {
            camera.device = device;
        }
        camera.width = env_or("ROLLCALL_CAMERA_WIDTH", camera.width);
        camera.height = env_or("ROLLCALL_CAMERA_HEIGHT", camera.height);
        camera.warmup_frames = env_or("ROLLCALL_WARMUP_FRAMES", camera.warmup_frames);

        let mut attendance: AttendanceConfig = file.section("attendance")?;
        attendance.cooldown_secs = env_or("ROLLCALL_COOLDOWN_SECS", attendance.cooldown_secs);
        attendance.queue_capacity = env_or("ROLLCALL_QUEUE_CAPACITY", attendance.queue_capacity).max(1);

        Ok(Self {
            camera,
            recognition: file.section::<RecognitionConfig>("recognition")?.with_env(),
            attendance,
            database: DatabaseConfig::load(file)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_from_file() {
        let file = ConfigFile::parse(
            r#"
            [camera]
            device = "/dev/video2"
            width = 1280

            [recognition]
            threshold = 0.9
            images_dir = "faces"

            [attendance]
            cooldown_secs = 60
            "#,
        )
        .unwrap();

        let camera: CameraConfig = file.section("camera").unwrap();
        assert_eq!(camera.device, "/dev/video2");
        assert_eq!(camera.width, 1280);
        assert_eq!(camera.height, 480);

        let recognition: RecognitionConfig = file.section("recognition").unwrap();
        assert_eq!(recognition.threshold, 0.9);
        assert_eq!(recognition.images_dir, std::path::PathBuf::from("faces"));

        let attendance: AttendanceConfig = file.section("attendance").unwrap();
        assert_eq!(attendance.cooldown(), Duration::from_secs(60));
        assert_eq!(attendance.queue_capacity, 16);
    }

    #[test]
    fn test_empty_file_defaults() {
        let config = Config::from_file(&ConfigFile::default()).unwrap();
        assert_eq!(config.attendance.cooldown_secs, 30);
        assert_eq!(config.database.root, "Students");
    }
}
