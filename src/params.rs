/// Query-string parameters appended to a request URL.
///
/// Pairs keep their insertion order, so the resolved URL (and with it the
/// cache/dedup key) is stable for the same sequence of calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    /// Appends a parameter only when `value` is present.
    pub fn with_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl From<()> for QueryParams {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl<K, V> From<Vec<(K, V)>> for QueryParams
where
    K: Into<String>,
    V: ToString,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for QueryParams
where
    K: Into<String>,
    V: ToString,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::QueryParams;

    #[test]
    fn keeps_insertion_order() {
        let params = QueryParams::new().with("page", 2).with("limit", 20);
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("page", "2"), ("limit", "20")]);
    }

    #[test]
    fn with_opt_skips_missing_values() {
        let params = QueryParams::new()
            .with_opt("status", Some("confirmed"))
            .with_opt::<&str>("from", None);
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn conversions() {
        assert!(QueryParams::from(()).is_empty());
        assert_eq!(
            QueryParams::from([("tenant", "demo")]),
            QueryParams::new().with("tenant", "demo")
        );
        assert_eq!(
            QueryParams::from(vec![("a".to_owned(), 1)]),
            QueryParams::new().with("a", 1)
        );
    }
}
