//! Finds out whether a target type decodes from a JSON array.
//!
//! The type's `Deserialize` impl is run against a deserializer that holds no
//! data and only records which entry point was asked for.

use super::Expect;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::forward_to_deserialize_any;
use std::fmt;

#[derive(Debug)]
struct Probed(Expect);

impl fmt::Display for Probed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape probe: {:?}", self.0)
    }
}

impl std::error::Error for Probed {}

impl de::Error for Probed {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Probed(Expect::Single)
    }
}

struct ShapeProbe;

impl<'de> Deserializer<'de> for ShapeProbe {
    type Error = Probed;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Probed> {
        Err(Probed(Expect::Single))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Probed> {
        Err(Probed(Expect::Collection))
    }

    // `Option<Vec<T>>` and newtype wrappers take the shape of what they hold.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Probed> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Probed> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        bytes byte_buf unit unit_struct tuple tuple_struct map struct
        enum identifier ignored_any
    }
}

pub(super) fn expect_for<T: DeserializeOwned>() -> Expect {
    match T::deserialize(ShapeProbe) {
        Err(Probed(expect)) => expect,
        Ok(_) => Expect::Single,
    }
}
