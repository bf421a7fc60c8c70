use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;
use crate::detect::backends::{MotionOracle, StubOracle};
use crate::detect::oracle::DetectionOracle;
use crate::detect::worker::WorkerOracle;

/// Build the oracle named by `settings.model`.
///
/// - `stub`: fixed centred box
/// - `motion`: frame differencing
/// - `*.onnx`: YOLOv8 on tract (feature `backend-tract`)
///
/// With `offload`, the backend runs behind a `WorkerOracle`.
pub fn open_oracle(settings: &DetectorSettings) -> Result<Box<dyn DetectionOracle>> {
    let mut backend: Box<dyn DetectionOracle> = match settings.model.trim() {
        "stub" => Box::new(StubOracle::new()),
        "motion" => Box::new(MotionOracle::new()),
        path if path.ends_with(".onnx") => open_onnx(path)?,
        other => {
            return Err(anyhow!(
                "unknown detector model '{}'; expected stub, motion or an .onnx path",
                other
            ))
        }
    };
    backend.warm_up()?;
    log::info!("detector: {} backend ready", backend.name());

    if settings.offload {
        log::info!(
            "detector: offloading inference to worker thread (timeout {} ms)",
            settings.timeout.as_millis()
        );
        return Ok(Box::new(WorkerOracle::spawn(backend, settings.timeout)?));
    }
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn open_onnx(path: &str) -> Result<Box<dyn DetectionOracle>> {
    Ok(Box::new(crate::detect::backends::TractOracle::new(path)?))
}

#[cfg(not(feature = "backend-tract"))]
fn open_onnx(path: &str) -> Result<Box<dyn DetectionOracle>> {
    Err(anyhow!(
        "model {} requires the backend-tract feature",
        path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(model: &str, offload: bool) -> DetectorSettings {
        DetectorSettings {
            model: model.to_string(),
            offload,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn opens_builtin_backends() -> Result<()> {
        assert_eq!(open_oracle(&settings("stub", false))?.name(), "stub");
        assert_eq!(open_oracle(&settings("motion", false))?.name(), "motion");
        assert_eq!(open_oracle(&settings("motion", true))?.name(), "motion");
        Ok(())
    }

    #[test]
    fn rejects_unknown_models() {
        assert!(open_oracle(&settings("yolo-nano", false)).is_err());
    }
}
