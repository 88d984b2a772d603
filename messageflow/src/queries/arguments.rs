//! Named query arguments and their conversion to and from tuples.

use crate::errors::PipelineError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// The content of a query message: argument values keyed by parameter name.
pub type QueryArguments = serde_json::Map<String, Value>;

/// A tuple of concrete query argument values.
///
/// Implemented for `()` and for tuples of up to six elements whose types
/// are serde-convertible. Arguments are plain Rust values, so a call that
/// is not expressible as such a tuple does not compile.
pub trait Arguments: Sized + Send + 'static {
    /// The number of arguments.
    const ARITY: usize;

    /// Packs the values under their parameter names.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentConversion` if a value cannot be serialized.
    fn into_named(self, names: &[&'static str]) -> Result<QueryArguments, PipelineError>;

    /// Rebuilds the tuple from named values.
    ///
    /// A missing value is read as `null`.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentConversion` if a value does not fit its parameter.
    fn from_named(args: &QueryArguments, names: &[&'static str]) -> Result<Self, PipelineError>;
}

/// Converts one raw argument to its parameter type.
///
/// String values that do not deserialize directly are parsed as JSON text,
/// so `"10"` converts to `10_i32`.
///
/// # Errors
///
/// Returns `ArgumentConversion` if neither conversion succeeds.
pub fn convert_argument<T: DeserializeOwned>(name: &str, value: Option<&Value>) -> Result<T, PipelineError> {
    let value = value.cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<T>(value.clone()) {
        Ok(converted) => Ok(converted),
        Err(e) => match &value {
            Value::String(text) => serde_json::from_str::<T>(text)
                .map_err(|_| PipelineError::argument_conversion(name, e.to_string())),
            _ => Err(PipelineError::argument_conversion(name, e.to_string())),
        },
    }
}

fn encode_argument<T: Serialize>(name: &str, value: &T) -> Result<Value, PipelineError> {
    serde_json::to_value(value).map_err(|e| PipelineError::argument_conversion(name, e.to_string()))
}

fn name_at(names: &[&'static str], index: usize) -> Result<&'static str, PipelineError> {
    names.get(index).copied().ok_or_else(|| {
        PipelineError::configuration(format!("no parameter name for argument {index}"))
    })
}

impl Arguments for () {
    const ARITY: usize = 0;

    fn into_named(self, _names: &[&'static str]) -> Result<QueryArguments, PipelineError> {
        Ok(QueryArguments::new())
    }

    fn from_named(_args: &QueryArguments, _names: &[&'static str]) -> Result<Self, PipelineError> {
        Ok(())
    }
}

macro_rules! impl_arguments {
    ($arity:expr; $($ty:ident $idx:tt),+) => {
        impl<$($ty),+> Arguments for ($($ty,)+)
        where
            $($ty: Serialize + DeserializeOwned + Send + 'static),+
        {
            const ARITY: usize = $arity;

            fn into_named(self, names: &[&'static str]) -> Result<QueryArguments, PipelineError> {
                let mut args = QueryArguments::new();
                $(
                    let name = name_at(names, $idx)?;
                    args.insert(name.to_string(), encode_argument(name, &self.$idx)?);
                )+
                Ok(args)
            }

            fn from_named(args: &QueryArguments, names: &[&'static str]) -> Result<Self, PipelineError> {
                Ok(($(
                    {
                        let name = name_at(names, $idx)?;
                        convert_argument::<$ty>(name, args.get(name))?
                    },
                )+))
            }
        }
    };
}

impl_arguments!(1; A 0);
impl_arguments!(2; A 0, B 1);
impl_arguments!(3; A 0, B 1, C 2);
impl_arguments!(4; A 0, B 1, C 2, D 3);
impl_arguments!(5; A 0, B 1, C 2, D 3, E 4);
impl_arguments!(6; A 0, B 1, C 2, D 3, E 4, F 5);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn named(value: Value) -> QueryArguments {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_tuple_is_keyed_by_parameter_name() {
        let args = (10_i32, "eur".to_string()).into_named(&["amount", "currency"]).unwrap();
        assert_eq!(Value::Object(args), json!({"amount": 10, "currency": "eur"}));
    }

    #[test]
    fn test_from_named_reads_in_parameter_order() {
        let args = named(json!({"b": 5, "a": 10}));
        let (a, b) = <(i32, i32)>::from_named(&args, &["a", "b"]).unwrap();
        assert_eq!((a, b), (10, 5));
    }

    #[test]
    fn test_string_values_fall_back_to_json_text() {
        let args = named(json!({"a": "10", "tags": "[\"x\",\"y\"]"}));
        let (a, tags) = <(i64, Vec<String>)>::from_named(&args, &["a", "tags"]).unwrap();
        assert_eq!(a, 10);
        assert_eq!(tags, vec!["x", "y"]);
    }

    #[test]
    fn test_plain_strings_stay_strings() {
        let args = named(json!({"name": "ada"}));
        let (name,) = <(String,)>::from_named(&args, &["name"]).unwrap();
        assert_eq!(name, "ada");
    }

    #[test]
    fn test_missing_value_is_null() {
        let args = QueryArguments::new();
        let (limit,) = <(Option<u32>,)>::from_named(&args, &["limit"]).unwrap();
        assert_eq!(limit, None);

        let err = <(u32,)>::from_named(&args, &["limit"]).unwrap_err();
        assert!(matches!(err, PipelineError::ArgumentConversion { ref name, .. } if name == "limit"));
    }

    #[test]
    fn test_unconvertible_value() {
        let args = named(json!({"a": "ten"}));
        let err = <(i32,)>::from_named(&args, &["a"]).unwrap_err();
        assert_eq!(err.kind_name(), "ArgumentConversion");
    }

    #[test]
    fn test_arity() {
        assert_eq!(<()>::ARITY, 0);
        assert_eq!(<(u8,)>::ARITY, 1);
        assert_eq!(<(u8, u8, u8, u8, u8, u8)>::ARITY, 6);
    }
}
