//! `tessera-common` defines the data types shared by the Tessera token services:
//! identifiers, token kinds, typed claim sets and the user aggregate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{fmt::Display, marker::PhantomData, str::FromStr};

use serde::de::{Error, Visitor};

/// Custom claims per token kind.
pub mod claims;

/// Identifiers.
pub mod id;

/// Token kinds.
pub mod kind;

/// The user aggregate.
pub mod user;

#[derive(Default)]
struct FromStrVisitor<T> {
    expecting: &'static str,
    phantom: PhantomData<T>,
}

impl<T> FromStrVisitor<T> {
    pub fn new(expecting: &'static str) -> Self {
        Self {
            expecting,
            phantom: PhantomData,
        }
    }
}

impl<T: FromStr> Visitor<'_> for FromStrVisitor<T>
where
    T::Err: Display,
{
    type Value = T;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.expecting)
    }

    fn visit_str<E: Error>(self, str: &str) -> Result<Self::Value, E> {
        T::from_str(str).map_err(|msg| E::custom(msg))
    }
}
