use std::fs;
use std::path::Path;

use crate::drones::QuadParams;
use crate::utils::errors::{Result, SimError};
use crate::world::WorldSettings;

/// Parse world settings from a YAML string. Unset fields fall back to the
/// defaults; the result is validated before it is returned.
pub fn world_settings_from_yaml(yaml: &str) -> Result<WorldSettings> {
    let settings: WorldSettings = serde_yaml::from_str(yaml)
        .map_err(|err| SimError::configuration(format!("invalid world settings: {}", err)))?;
    settings.validate()?;
    Ok(settings)
}

pub fn load_world_settings(path: impl AsRef<Path>) -> Result<WorldSettings> {
    let text = fs::read_to_string(path.as_ref()).map_err(|err| {
        SimError::configuration(format!(
            "failed to read {}: {}",
            path.as_ref().display(),
            err
        ))
    })?;
    world_settings_from_yaml(&text)
}

/// Parse a full vehicle parameter set from YAML and validate it.
pub fn quad_params_from_yaml(yaml: &str) -> Result<QuadParams> {
    let params: QuadParams = serde_yaml::from_str(yaml)
        .map_err(|err| SimError::configuration(format!("invalid vehicle config: {}", err)))?;
    params.validate()?;
    Ok(params)
}

pub fn load_quad_params(path: impl AsRef<Path>) -> Result<QuadParams> {
    let text = fs::read_to_string(path.as_ref()).map_err(|err| {
        SimError::configuration(format!(
            "failed to read {}: {}",
            path.as_ref().display(),
            err
        ))
    })?;
    quad_params_from_yaml(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ErrorKind;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_settings_defaults() {
        let settings = world_settings_from_yaml("{}").unwrap();
        assert!(settings.enable_collisions);
        assert_relative_eq!(settings.gravity.z, -9.81, epsilon = 1e-5);
    }

    #[test]
    fn test_world_settings_override() {
        let yaml = "gravity: [0.0, 0.0, -1.62]\nsolver_iterations: 12\n";
        let settings = world_settings_from_yaml(yaml).unwrap();
        assert_relative_eq!(settings.gravity.z, -1.62, epsilon = 1e-6);
        assert_eq!(settings.solver_iterations, 12);
    }

    #[test]
    fn test_invalid_yaml_is_configuration_error() {
        let err = world_settings_from_yaml("gravity: not-a-vector").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_quad_params_roundtrip() {
        let params = QuadParams::hummingbird();
        let yaml = serde_yaml::to_string(&params).unwrap();
        let parsed = quad_params_from_yaml(&yaml).unwrap();
        assert_relative_eq!(parsed.inertia.mass, 0.5, epsilon = 1e-6);
        assert_eq!(parsed.geometry.n_rotors(), 4);
    }

    #[test]
    fn test_quad_params_validation_applies() {
        let mut params = QuadParams::hummingbird();
        params.inertia.mass = -2.0;
        let yaml = serde_yaml::to_string(&params).unwrap();
        let err = quad_params_from_yaml(&yaml).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_world_settings("/definitely/not/here.yaml").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
