//! Named tag tree for structured payloads.
//!
//! A `CompoundTag` is an ordered list of named values; a `ListTag` is an
//! ordered list of unnamed values. Entry order is preserved on the wire.

use prost::Message;

/// A single tag value.
#[derive(Clone, PartialEq, Message)]
pub struct Tag {
    #[prost(oneof = "tag::Value", tags = "1, 2, 3, 4, 5, 6")]
    pub value: Option<tag::Value>,
}

pub mod tag {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(int32, tag = "1")]
        Int(i32),

        #[prost(int64, tag = "2")]
        Long(i64),

        #[prost(float, tag = "3")]
        Float(f32),

        #[prost(string, tag = "4")]
        String(String),

        #[prost(message, tag = "5")]
        Compound(super::CompoundTag),

        #[prost(message, tag = "6")]
        List(super::ListTag),
    }
}

impl Tag {
    pub fn int(v: i32) -> Self {
        Self {
            value: Some(tag::Value::Int(v)),
        }
    }

    pub fn long(v: i64) -> Self {
        Self {
            value: Some(tag::Value::Long(v)),
        }
    }

    pub fn float(v: f32) -> Self {
        Self {
            value: Some(tag::Value::Float(v)),
        }
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self {
            value: Some(tag::Value::String(v.into())),
        }
    }

    pub fn compound(v: CompoundTag) -> Self {
        Self {
            value: Some(tag::Value::Compound(v)),
        }
    }

    pub fn list(v: ListTag) -> Self {
        Self {
            value: Some(tag::Value::List(v)),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self.value {
            Some(tag::Value::Int(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundTag> {
        match &self.value {
            Some(tag::Value::Compound(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListTag> {
        match &self.value {
            Some(tag::Value::List(v)) => Some(v),
            _ => None,
        }
    }
}

/// A named entry inside a `CompoundTag`.
#[derive(Clone, PartialEq, Message)]
pub struct NamedTag {
    #[prost(string, tag = "1")]
    pub name: String,

    #[prost(message, optional, tag = "2")]
    pub value: Option<Tag>,
}

/// Ordered map of named tags. Names are unique; setting an existing name
/// replaces its value in place.
#[derive(Clone, PartialEq, Message)]
pub struct CompoundTag {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<NamedTag>,
}

impl CompoundTag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any existing entry.
    pub fn set(&mut self, name: impl Into<String>, value: Tag) {
        let name = name.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.value = Some(value),
            None => self.entries.push(NamedTag {
                name,
                value: Some(value),
            }),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Tag) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_int(self, name: impl Into<String>, v: i32) -> Self {
        self.with(name, Tag::int(v))
    }

    pub fn with_float(self, name: impl Into<String>, v: f32) -> Self {
        self.with(name, Tag::float(v))
    }

    pub fn with_compound(self, name: impl Into<String>, v: CompoundTag) -> Self {
        self.with(name, Tag::compound(v))
    }

    pub fn with_list(self, name: impl Into<String>, v: ListTag) -> Self {
        self.with(name, Tag::list(v))
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_ref())
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(Tag::as_int)
    }

    pub fn get_compound(&self, name: &str) -> Option<&CompoundTag> {
        self.get(name).and_then(Tag::as_compound)
    }

    pub fn get_list(&self, name: &str) -> Option<&ListTag> {
        self.get(name).and_then(Tag::as_list)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered list of unnamed tags.
#[derive(Clone, PartialEq, Message)]
pub struct ListTag {
    #[prost(message, repeated, tag = "1")]
    pub elements: Vec<Tag>,
}

impl ListTag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Tag) {
        self.elements.push(value);
    }

    /// Iterate the compound elements, skipping anything else.
    pub fn compounds(&self) -> impl Iterator<Item = &CompoundTag> {
        self.elements.iter().filter_map(Tag::as_compound)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromIterator<CompoundTag> for ListTag {
    fn from_iter<I: IntoIterator<Item = CompoundTag>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().map(Tag::compound).collect(),
        }
    }
}
