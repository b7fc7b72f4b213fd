use std::fs;

use crate::{config::Config, error::ConfigError};

pub fn read_config(filename: &str) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(filename).map_err(|source| ConfigError::Read {
        path: filename.to_string(),
        source,
    })?;

    let data: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: filename.to_string(),
        source,
    })?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen:\n  port: 9999\nupstream:\n  backends:\n    - /tmp/only.sock\n"
        )
        .unwrap();

        let config = read_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.listen.port, 9999);
        assert_eq!(config.upstream.backends.len(), 1);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen: [unclosed").unwrap();

        let err = read_config(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
