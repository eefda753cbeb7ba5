//! Header fields of a request, a response, or a multipart part.

/// One `name: value` line. The name keeps the case it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    value: String,
}

impl Field {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Ordered header fields with case-insensitive lookup.
///
/// Repeated names are kept as separate fields, in arrival order, and are
/// written back out the same way.
///
/// ```
/// use switchyard::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Vary", "Origin");
/// headers.insert("vary", "Accept");
/// headers.set("Content-Type", "text/plain");
///
/// assert_eq!(headers.get("VARY"), Some("Origin"));
/// assert_eq!(headers.get_all("vary").count(), 2);
/// assert_eq!(headers.content_type(), Some("text/plain"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<Field>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Adds a field after the existing ones, even if the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Leaves exactly one field named `name`, holding `value`.
    ///
    /// The first existing field is overwritten in place so the header keeps
    /// its position; any later duplicates are dropped.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.fields.iter().position(|f| f.is(&name)) {
            Some(first) => {
                self.fields[first].value = value.into();
                let mut index = 0;
                self.fields.retain(|f| {
                    let keep = index <= first || !f.is(&name);
                    index += 1;
                    keep
                });
            }
            None => self.insert(name, value),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.fields
            .iter()
            .filter(move |f| f.is(name))
            .map(|f| f.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.is(name))
    }

    /// Drops every field named `name`; `true` if something was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.is(name));
        self.fields.len() != before
    }

    /// `Content-Length` as a number, if present and well formed.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.trim().parse().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `(name, value)` pairs in the order they will be written.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
    }
}
