//! In-memory model of `redis.conf`.
//!
//! A config is an ordered list of `(key, value)` parameters. Order is kept
//! as read, and multi-valued directives (`save`, `rename-command`) may
//! appear more than once. Comments and blank lines are dropped on read and
//! never written back.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::{ConfError, ConfResult};
use crate::memory::parse_memory_string_to_bytes;

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_HOST: &str = "127.0.0.1";

/// A single `key value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered `redis.conf` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedisConf {
    params: Vec<Param>,
}

impl RedisConf {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    /// Read and decode a config file.
    pub fn load(path: &Path) -> ConfResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::decode(&content))
    }

    /// Encode and write the config, replacing any existing file.
    pub fn save(&self, path: &Path) -> ConfResult<()> {
        fs::write(path, self.encode()).map_err(|source| ConfError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config text. Never fails: malformed lines become keys with an
    /// empty value, which is how redis itself would report them.
    pub fn decode(content: &str) -> Self {
        let params = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| match line.split_once(char::is_whitespace) {
                Some((key, value)) => Param::new(key, value.trim()),
                None => Param::new(line, ""),
            })
            .collect();
        Self { params }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        for param in &self.params {
            let _ = writeln!(out, "{} {}", param.key, param.value);
        }
        out
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// First value for `key`. Directive names are case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }

    /// All values for a multi-valued directive, in file order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }

    /// Update the first occurrence of `key`, or append it.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .params
            .iter_mut()
            .find(|p| p.key.eq_ignore_ascii_case(key))
        {
            Some(param) => param.value = value,
            None => self.params.push(Param::new(key, value)),
        }
    }

    /// Append a parameter even if the key already exists.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.params.push(Param::new(key, value));
    }

    /// `requirepass` with any surrounding quotes removed. Empty when unset.
    pub fn password(&self) -> String {
        self.get("requirepass").map(strip_quotes).unwrap_or_default()
    }

    pub fn port(&self) -> ConfResult<u16> {
        match self.get("port") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfError::InvalidPort(raw.to_string())),
            None => Ok(DEFAULT_PORT),
        }
    }

    /// First address of the `bind` directive, or loopback.
    pub fn host(&self) -> String {
        self.get("bind")
            .and_then(|b| b.split_whitespace().next())
            .unwrap_or(DEFAULT_HOST)
            .to_string()
    }

    /// Name under which `command` is reachable.
    ///
    /// Returns `command` unchanged when there is no `rename-command` entry,
    /// and an empty string when the command was disabled with `""`.
    pub fn command_alias(&self, command: &str) -> String {
        for value in self.get_all("rename-command") {
            let mut parts = value.split_whitespace();
            let (Some(original), Some(alias)) = (parts.next(), parts.next()) else {
                continue;
            };
            if original.eq_ignore_ascii_case(command) {
                return strip_quotes(alias);
            }
        }
        command.to_string()
    }

    /// Build the config of a dedicated node: the default config with the
    /// given password, `maxmemory` normalised to bytes.
    pub fn init_for_dedicated_node(default: &RedisConf, password: &str) -> ConfResult<Self> {
        let mut conf = default.clone();
        if let Some(maxmemory) = conf.get("maxmemory").map(str::to_string) {
            conf.set("maxmemory", parse_memory_string_to_bytes(&maxmemory)?);
        }
        conf.set("requirepass", password);
        Ok(conf)
    }
}

fn strip_quotes(value: &str) -> String {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}
