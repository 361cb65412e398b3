//! Parsing of `--place KIND@X,Y` requests.

use std::{num::ParseFloatError, str::FromStr};

use thiserror::Error;
use wave_defence_core::{Catalog, DefenderKindId, Vec2};

/// Defender kind as written on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum KindRef {
    /// Catalog index.
    Index(u32),
    /// Catalog display name.
    Name(String),
}

/// One requested defender placement.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PlacementRequest {
    pub(crate) kind: KindRef,
    pub(crate) position: Vec2,
}

/// Errors raised while parsing a placement request.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum PlacementParseError {
    /// The `@` separating kind and position is missing.
    #[error("expected KIND@X,Y")]
    MissingSeparator,
    /// The kind is empty.
    #[error("defender kind is empty")]
    EmptyKind,
    /// The position is not two comma separated numbers.
    #[error("expected position X,Y")]
    MalformedPosition,
    /// A coordinate failed to parse.
    #[error("invalid coordinate: {0}")]
    Coordinate(#[from] ParseFloatError),
}

impl FromStr for PlacementRequest {
    type Err = PlacementParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, position) = value
            .split_once('@')
            .ok_or(PlacementParseError::MissingSeparator)?;
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(PlacementParseError::EmptyKind);
        }
        let kind = match kind.parse::<u32>() {
            Ok(index) => KindRef::Index(index),
            Err(_) => KindRef::Name(kind.to_owned()),
        };

        let (x, y) = position
            .split_once(',')
            .ok_or(PlacementParseError::MalformedPosition)?;
        let position = Vec2::new(x.trim().parse()?, y.trim().parse()?);
        Ok(Self { kind, position })
    }
}

impl PlacementRequest {
    /// Resolves the kind against the catalog.
    pub(crate) fn resolve(&self, catalog: &Catalog) -> Option<DefenderKindId> {
        match &self.kind {
            KindRef::Index(index) => {
                let kind = DefenderKindId::new(*index);
                catalog.defender(kind).map(|_| kind)
            }
            KindRef::Name(name) => catalog.defender_by_name(name),
        }
    }
}
