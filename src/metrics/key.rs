use std::fmt;

use serde::Serialize;

/// Delimiter between the components of an emitted metric name.
pub const NAME_DELIMITER: char = '|';

/// Aggregation key: which replica served the request, and on which route.
///
/// Kept structured all the way to the sink boundary; only `MetricName`
/// flattens it into a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BucketKey {
    pub instance: String,
    pub path: String,
}

impl BucketKey {
    pub fn new(instance: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            path: path.into(),
        }
    }
}

/// Which summary statistic a flushed measurement carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Min,
    Max,
    Average,
}

impl Statistic {
    pub const ALL: [Statistic; 3] = [Statistic::Min, Statistic::Max, Statistic::Average];

    pub fn as_str(self) -> &'static str {
        match self {
            Statistic::Min => "Min",
            Statistic::Max => "Max",
            Statistic::Average => "Average",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stat| stat.as_str() == s)
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<prefix>|<instance>|<path>|<Statistic>`
///
/// `|` and `%` inside the prefix, instance or path are percent-escaped
/// (`%7C`, `%25`) so that splitting on `|` always yields four parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricName {
    pub prefix: String,
    pub key: BucketKey,
    pub statistic: Statistic,
}

impl MetricName {
    pub fn new(prefix: &str, key: &BucketKey, statistic: Statistic) -> Self {
        Self {
            prefix: prefix.to_owned(),
            key: key.clone(),
            statistic,
        }
    }

    /// Recover the components of a name produced by `Display`.
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split(NAME_DELIMITER);
        let prefix = unescape(parts.next()?)?;
        let instance = unescape(parts.next()?)?;
        let path = unescape(parts.next()?)?;
        let statistic = Statistic::parse(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            prefix,
            key: BucketKey::new(instance, path),
            statistic,
        })
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            escape(&self.prefix),
            escape(&self.key.instance),
            escape(&self.key.path),
            self.statistic,
            d = NAME_DELIMITER,
        )
    }
}

fn escape(component: &str) -> String {
    component.replace('%', "%25").replace('|', "%7C")
}

fn unescape(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut rest = component;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3)?;
        match code {
            "25" => out.push('%'),
            "7C" | "7c" => out.push('|'),
            _ => return None,
        }
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);
    Some(out)
}
