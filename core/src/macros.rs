//! Declarative macros for identifier boilerplate.
//!
//! Command, event and sequence identifiers, as well as most aggregate
//! identifiers, are thin wrappers around a [`uuid::Uuid`]. The macro below
//! generates the newtype together with the conversions every identifier needs.

/// Define a UUID-backed identifier newtype.
///
/// The generated type is `Copy`, hashable, ordered, serializable, parses
/// from its hyphenated string form and displays as one. Because it
/// implements `FromStr` and `Display`, it can be used directly as an
/// aggregate identifier.
///
/// # Example
///
/// ```
/// eventloom_core::uuid_identifier! {
///     /// Identifier of a shopping cart.
///     pub struct CartId;
/// }
///
/// let id = CartId::generate();
/// let parsed: CartId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[macro_export]
macro_rules! uuid_identifier {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            ::std::clone::Clone,
            ::std::marker::Copy,
            ::std::fmt::Debug,
            ::std::cmp::PartialEq,
            ::std::cmp::Eq,
            ::std::hash::Hash,
            ::std::cmp::PartialOrd,
            ::std::cmp::Ord,
        )]
        $vis struct $name($crate::uuid::Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self($crate::uuid::Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: $crate::uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &$crate::uuid::Uuid {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl $crate::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::serde::Serializer,
            {
                $crate::serde::Serialize::serialize(&self.0, serializer)
            }
        }

        impl<'de> $crate::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::serde::Deserializer<'de>,
            {
                <$crate::uuid::Uuid as $crate::serde::Deserialize<'de>>::deserialize(deserializer)
                    .map(Self)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::uuid::Error;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                $crate::uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}
