//! Conversion of typed option structs into command line arguments.
//!
//! Option structs derive [`serde::Serialize`] and name every field after the
//! flag it maps to:
//!
//! - `#[serde(rename(serialize = "--flag="))]` joins flag and value into a
//!   single token (`--flag=value`),
//! - `#[serde(rename(serialize = "--flag"))]` emits flag and value as two
//!   tokens (`--flag value`),
//! - a name that doesn't start with `-` is a positional argument,
//! - `#[serde(skip_serializing)]` excludes the field, e.g. because the value
//!   is passed through the environment instead.
//!
//! Fields holding the zero value of their type (`0`, `""`, `false`, `[]`,
//! `None`) are never emitted. Lists repeat their flag once per element and
//! nested structs are spliced in place.

use std::fmt::Display;

use derive_more::{Display, Error};
use serde::ser::{self, Serialize};

/// Convert `value` into an ordered list of command line arguments.
///
/// Field types without a command line representation (floats, maps, byte
/// strings, enum variants carrying data) are skipped with a warning.
pub fn to_args<T: Serialize + ?Sized>(value: &T) -> Vec<String> {
    let mut args = Vec::new();
    if let Err(e) = value.serialize(FieldSerializer::new("", &mut args)) {
        log::warn!(target: "args", "Marshaling arguments failed: {e}");
    }
    args
}

/// Error raised by custom [`Serialize`] implementations.
///
/// Never surfaced by [`to_args`], which skips the affected field instead.
#[derive(Debug, Display, Error)]
#[display("{_0}")]
pub struct MarshalError(#[error(ignore)] String);

impl ser::Error for MarshalError {
    fn custom<T: Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// Serializes a single field value under `flag`.
struct FieldSerializer<'a> {
    flag: &'static str,
    out: &'a mut Vec<String>,
}

impl<'a> FieldSerializer<'a> {
    fn new(flag: &'static str, out: &'a mut Vec<String>) -> Self {
        Self { flag, out }
    }

    fn push(self, value: String) -> Result<(), MarshalError> {
        if self.flag.is_empty() {
            self.out.push(value);
        } else if self.flag.ends_with('=') {
            self.out.push(format!("{}{value}", self.flag));
        } else {
            self.out.push(self.flag.to_string());
            self.out.push(value);
        }
        Ok(())
    }

    fn unsupported(&self, kind: &str) -> Result<(), MarshalError> {
        log::warn!(target: "args", "Skipping {kind} value of '{}': no command line representation", self.flag);
        Ok(())
    }
}

macro_rules! serialize_integer {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<(), MarshalError> {
                if v == 0 {
                    return Ok(());
                }
                self.push(v.to_string())
            }
        )*
    };
}

impl<'a> ser::Serializer for FieldSerializer<'a> {
    type Ok = ();
    type Error = MarshalError;

    type SerializeSeq = SeqArgs<'a>;
    type SerializeTuple = Skip;
    type SerializeTupleStruct = Skip;
    type SerializeTupleVariant = Skip;
    type SerializeMap = Skip;
    type SerializeStruct = StructArgs<'a>;
    type SerializeStructVariant = Skip;

    fn serialize_bool(self, v: bool) -> Result<(), MarshalError> {
        if !v {
            return Ok(());
        }
        if self.flag.is_empty() {
            return self.unsupported("positional boolean");
        }
        self.out.push(self.flag.trim_end_matches('=').to_string());
        Ok(())
    }

    serialize_integer! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
    }

    fn serialize_f32(self, _v: f32) -> Result<(), MarshalError> {
        self.unsupported("floating point")
    }

    fn serialize_f64(self, _v: f64) -> Result<(), MarshalError> {
        self.unsupported("floating point")
    }

    fn serialize_char(self, v: char) -> Result<(), MarshalError> {
        if v == '\0' {
            return Ok(());
        }
        self.push(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<(), MarshalError> {
        if v.is_empty() {
            return Ok(());
        }
        self.push(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<(), MarshalError> {
        self.unsupported("byte string")
    }

    fn serialize_none(self) -> Result<(), MarshalError> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), MarshalError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), MarshalError> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), MarshalError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), MarshalError> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), MarshalError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<(), MarshalError> {
        self.unsupported("enum variant")
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<SeqArgs<'a>, MarshalError> {
        Ok(SeqArgs {
            flag: self.flag,
            out: self.out,
        })
    }

    fn serialize_tuple(self, _len: usize) -> Result<Skip, MarshalError> {
        self.unsupported("tuple")?;
        Ok(Skip)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Skip, MarshalError> {
        self.unsupported("tuple struct")?;
        Ok(Skip)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Skip, MarshalError> {
        self.unsupported("enum variant")?;
        Ok(Skip)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Skip, MarshalError> {
        self.unsupported("map")?;
        Ok(Skip)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<StructArgs<'a>, MarshalError> {
        // nested structs carry their own flags
        Ok(StructArgs { out: self.out })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Skip, MarshalError> {
        self.unsupported("enum variant")?;
        Ok(Skip)
    }
}

/// Fields of a struct, each under its own flag.
struct StructArgs<'a> {
    out: &'a mut Vec<String>,
}

impl ser::SerializeStruct for StructArgs<'_> {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), MarshalError> {
        let flag = if key.starts_with('-') { key } else { "" };
        if let Err(e) = value.serialize(FieldSerializer::new(flag, self.out)) {
            log::warn!(target: "args", "Skipping field '{key}': {e}");
        }
        Ok(())
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

/// Elements of a list, repeating the flag of the list for every element.
struct SeqArgs<'a> {
    flag: &'static str,
    out: &'a mut Vec<String>,
}

impl ser::SerializeSeq for SeqArgs<'_> {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), MarshalError> {
        value.serialize(FieldSerializer::new(self.flag, self.out))
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

/// Swallows values without a command line representation.
struct Skip;

impl ser::SerializeTuple for Skip {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, _value: &T) -> Result<(), MarshalError> {
        Ok(())
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for Skip {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _value: &T) -> Result<(), MarshalError> {
        Ok(())
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for Skip {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _value: &T) -> Result<(), MarshalError> {
        Ok(())
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

impl ser::SerializeMap for Skip {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, _key: &T) -> Result<(), MarshalError> {
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, _value: &T) -> Result<(), MarshalError> {
        Ok(())
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for Skip {
    type Ok = ();
    type Error = MarshalError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        _value: &T,
    ) -> Result<(), MarshalError> {
        Ok(())
    }

    fn end(self) -> Result<(), MarshalError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Default, serde::Serialize)]
    struct Connection {
        #[serde(rename = "--host=")]
        host: String,
        #[serde(rename = "--port")]
        port: u16,
    }

    #[derive(Debug, Default, serde::Serialize)]
    #[serde(rename_all = "lowercase")]
    enum Compression {
        #[default]
        Auto,
        Max,
    }

    #[derive(Debug, Default, serde::Serialize)]
    struct DumpOptions {
        #[serde(rename = "--verbose")]
        verbose: bool,
        #[serde(rename = "--level=")]
        level: i32,
        #[serde(rename = "--exclude=")]
        exclude: Vec<String>,
        #[serde(rename = "--tag")]
        tag: Vec<String>,
        connection: Connection,
        #[serde(skip_serializing)]
        password: String,
        #[serde(rename = "--compression=")]
        compression: Option<Compression>,
        paths: Vec<String>,
    }

    #[derive(Debug, Default, serde::Serialize)]
    struct Unsupported {
        #[serde(rename = "--ratio=")]
        ratio: f64,
        #[serde(rename = "--labels=")]
        labels: HashMap<String, String>,
        #[serde(rename = "--name=")]
        name: String,
    }

    #[test]
    fn zero_value_struct_has_no_arguments() {
        assert!(to_args(&DumpOptions::default()).is_empty());
        assert!(to_args(&Connection::default()).is_empty());
    }

    #[test]
    fn fields_are_emitted_in_declaration_order() {
        let options = DumpOptions {
            verbose: true,
            level: -2,
            exclude: vec!["*.tmp".into()],
            tag: Vec::new(),
            connection: Connection {
                host: "db.local".into(),
                port: 3306,
            },
            password: "secret".into(),
            compression: Some(Compression::Max),
            paths: vec!["/srv".into(), "/etc".into()],
        };

        assert_eq!(
            to_args(&options),
            [
                "--verbose",
                "--level=-2",
                "--exclude=*.tmp",
                "--host=db.local",
                "--port",
                "3306",
                "--compression=max",
                "/srv",
                "/etc",
            ]
        );
    }

    #[test]
    fn list_repeats_flag_per_element() {
        let options = DumpOptions {
            exclude: vec!["a".into(), "b".into(), "c".into()],
            tag: vec!["daily".into(), "db".into()],
            ..Default::default()
        };

        let args = to_args(&options);
        assert_eq!(args.iter().filter(|a| a.starts_with("--exclude=")).count(), 3);
        assert_eq!(args.iter().filter(|a| *a == "--tag").count(), 2);
        assert_eq!(
            args,
            ["--exclude=a", "--exclude=b", "--exclude=c", "--tag", "daily", "--tag", "db"]
        );
    }

    #[test]
    fn skipped_field_is_never_emitted() {
        let options = DumpOptions {
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(to_args(&options).is_empty());
    }

    #[test]
    fn false_and_zero_are_suppressed_individually() {
        let options = DumpOptions {
            verbose: false,
            level: 0,
            connection: Connection {
                host: String::new(),
                port: 5432,
            },
            ..Default::default()
        };
        assert_eq!(to_args(&options), ["--port", "5432"]);
    }

    #[test]
    fn unsupported_types_are_skipped() {
        let options = Unsupported {
            ratio: 0.5,
            labels: HashMap::from([("a".to_string(), "b".to_string())]),
            name: "keep".into(),
        };
        assert_eq!(to_args(&options), ["--name=keep"]);
    }
}
