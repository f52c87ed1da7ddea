/// Builds a forward-channel POST body (`ofs`, `count`, `reqN_key=value`)
/// without callers hand-assembling the wire format.
#[derive(Debug, Default)]
pub struct ForwardBodyBuilder {
    ofs: u64,
    maps: Vec<Vec<(String, String)>>,
}

impl ForwardBodyBuilder {
    pub fn new(ofs: u64) -> Self {
        Self {
            ofs,
            maps: Vec::new(),
        }
    }

    /// Appends one map with the given key/value pairs.
    pub fn map<'a>(mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.maps.push(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
        );
        self
    }

    pub fn build(&self) -> String {
        let mut parts = vec![
            format!("count={}", self.maps.len()),
            format!("ofs={}", self.ofs),
        ];
        for (index, map) in self.maps.iter().enumerate() {
            for (key, value) in map {
                parts.push(format!(
                    "req{}_{}={}",
                    index,
                    urlencode(key),
                    urlencode(value)
                ));
            }
        }
        parts.join("&")
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
