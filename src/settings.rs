use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat, Source};
use serde::Deserialize;

/// Runtime settings, read from an optional `.env` file in the working
/// directory and then the process environment, which wins.
///
/// `URL_TO_SCRAPE` is the catalogue root; `DATABASE_PATH` and
/// `REQUEST_TIMEOUT_SECS` fall back to defaults.
#[derive(Debug, Deserialize)]
pub struct Settings {
    pub url_to_scrape: Option<String>,
    pub database_path: PathBuf,
    pub request_timeout_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        // KEY=value lines parse as a section-less INI file.
        let dotenv = File::new(".env", FileFormat::Ini).required(false);
        Self::from_sources(dotenv, Environment::default())
    }

    fn from_sources<S>(dotenv: S, env: Environment) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        Config::builder()
            .set_default("database_path", "data/books.sqlite")?
            .set_default("request_timeout_secs", 30)?
            .add_source(dotenv)
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        Environment::default().source(Some(map))
    }

    fn no_dotenv() -> File<config::FileSourceString, FileFormat> {
        File::from_str("", FileFormat::Ini)
    }

    #[test]
    fn defaults() {
        let s = Settings::from_sources(no_dotenv(), env(&[])).unwrap();
        assert_eq!(s.url_to_scrape, None);
        assert_eq!(s.database_path, PathBuf::from("data/books.sqlite"));
        assert_eq!(s.request_timeout_secs, 30);
    }

    #[test]
    fn environment_overrides() {
        let s = Settings::from_sources(no_dotenv(), env(&[
            ("URL_TO_SCRAPE", "https://books.toscrape.com/"),
            ("DATABASE_PATH", "/tmp/catalogue.sqlite"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(s.url_to_scrape.as_deref(), Some("https://books.toscrape.com/"));
        assert_eq!(s.database_path, PathBuf::from("/tmp/catalogue.sqlite"));
        assert_eq!(s.request_timeout_secs, 5);
    }

    #[test]
    fn dotenv_file_supplies_root_url() {
        let dotenv = File::from_str(
            "URL_TO_SCRAPE=\"https://books.toscrape.com/\"\nREQUEST_TIMEOUT_SECS=10\n",
            FileFormat::Ini,
        );
        let s = Settings::from_sources(dotenv, env(&[])).unwrap();
        assert_eq!(s.url_to_scrape.as_deref(), Some("https://books.toscrape.com/"));
        assert_eq!(s.request_timeout_secs, 10);
        assert_eq!(s.database_path, PathBuf::from("data/books.sqlite"));
    }

    #[test]
    fn environment_beats_dotenv() {
        let dotenv = File::from_str("URL_TO_SCRAPE=https://old.example/\n", FileFormat::Ini);
        let s = Settings::from_sources(dotenv, env(&[("URL_TO_SCRAPE", "https://new.example/")]))
            .unwrap();
        assert_eq!(s.url_to_scrape.as_deref(), Some("https://new.example/"));
    }
}
