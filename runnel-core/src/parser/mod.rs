use crate::config::{ConfigOptions, RunnableConfig};
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Auto,
}

#[derive(Debug, Clone)]
pub struct ParsedConfig {
    pub options: ConfigOptions,
    pub format: ConfigFormat,
}

impl ParsedConfig {
    pub fn into_config(self) -> Result<RunnableConfig, ParseError> {
        Ok(RunnableConfig::try_from(self.options)?)
    }
}

pub fn parse_config_str(input: &str, format: ConfigFormat) -> Result<ParsedConfig, ParseError> {
    match format {
        ConfigFormat::Json => Ok(ParsedConfig {
            options: serde_json::from_str::<ConfigOptions>(input)?,
            format,
        }),
        ConfigFormat::Yaml => Ok(ParsedConfig {
            options: serde_yaml::from_str::<ConfigOptions>(input)?,
            format,
        }),
        ConfigFormat::Auto => parse_config_auto(input),
    }
}

/// Parses and validates in one step.
pub fn config_from_str(input: &str, format: ConfigFormat) -> Result<RunnableConfig, ParseError> {
    parse_config_str(input, format)?.into_config()
}

fn parse_config_auto(input: &str) -> Result<ParsedConfig, ParseError> {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return Err(ParseError::UnknownFormat);
    }

    // JSON always starts with `{` after trimming; YAML is the fallback either way.
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<ConfigOptions>(input) {
            Ok(options) => Ok(ParsedConfig {
                options,
                format: ConfigFormat::Json,
            }),
            Err(json_err) => match serde_yaml::from_str::<ConfigOptions>(input) {
                Ok(options) => Ok(ParsedConfig {
                    options,
                    format: ConfigFormat::Yaml,
                }),
                Err(_) => Err(ParseError::Json(json_err)),
            },
        };
    }

    match serde_yaml::from_str::<ConfigOptions>(input) {
        Ok(options) => Ok(ParsedConfig {
            options,
            format: ConfigFormat::Yaml,
        }),
        Err(yaml_err) => match serde_json::from_str::<ConfigOptions>(input) {
            Ok(options) => Ok(ParsedConfig {
                options,
                format: ConfigFormat::Json,
            }),
            Err(_) => Err(ParseError::Yaml(yaml_err)),
        },
    }
}
