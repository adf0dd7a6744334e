// used so generic containers can hold values too
use serde::{Deserialize, Serialize};

// used for the one-shot lookup table from datatype IRI to datatype
use lazy_static::lazy_static;
use std::collections::HashMap;

// used to print out readable forms of a value
use std::fmt;

// Generates a closed, versionable datatype enumeration. The declaration order
// is the ordinal that ends up in spilled bytes, so new members go at the end.
macro_rules! well_known {
    (
        $(#[$meta:meta])*
        $name:ident in $namespace:literal {
            $($variant:ident => $local:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }
        impl $name {
            pub const NAMESPACE: &'static str = $namespace;
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub fn ordinal(self) -> u32 {
                self as u32
            }
            pub fn from_ordinal(ordinal: u32) -> Option<Self> {
                Self::ALL.get(ordinal as usize).copied()
            }
            pub fn iri(self) -> &'static str {
                match self {
                    $($name::$variant => concat!($namespace, $local)),+
                }
            }
            pub fn from_iri(iri: &str) -> Option<Self> {
                match iri.strip_prefix($namespace)? {
                    $($local => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

well_known! {
    /// XML Schema datatypes.
    Xsd in "http://www.w3.org/2001/XMLSchema#" {
        Entities => "ENTITIES",
        Entity => "ENTITY",
        Id => "ID",
        IdRef => "IDREF",
        IdRefs => "IDREFS",
        NcName => "NCName",
        NmToken => "NMTOKEN",
        NmTokens => "NMTOKENS",
        Notation => "NOTATION",
        Name => "Name",
        QName => "QName",
        AnyUri => "anyURI",
        Base64Binary => "base64Binary",
        Boolean => "boolean",
        Byte => "byte",
        Date => "date",
        DateTime => "dateTime",
        DateTimeStamp => "dateTimeStamp",
        DayTimeDuration => "dayTimeDuration",
        Decimal => "decimal",
        Double => "double",
        Duration => "duration",
        Float => "float",
        GDay => "gDay",
        GMonth => "gMonth",
        GMonthDay => "gMonthDay",
        GYear => "gYear",
        GYearMonth => "gYearMonth",
        HexBinary => "hexBinary",
        Int => "int",
        Integer => "integer",
        Language => "language",
        Long => "long",
        NegativeInteger => "negativeInteger",
        NonNegativeInteger => "nonNegativeInteger",
        NonPositiveInteger => "nonPositiveInteger",
        NormalizedString => "normalizedString",
        PositiveInteger => "positiveInteger",
        Short => "short",
        String => "string",
        Time => "time",
        Token => "token",
        UnsignedByte => "unsignedByte",
        UnsignedInt => "unsignedInt",
        UnsignedLong => "unsignedLong",
        UnsignedShort => "unsignedShort",
        YearMonthDuration => "yearMonthDuration",
    }
}

well_known! {
    /// GeoSPARQL literal datatypes.
    Geo in "http://www.opengis.net/ont/geosparql#" {
        WktLiteral => "wktLiteral",
        GmlLiteral => "gmlLiteral",
    }
}

well_known! {
    /// Datatypes built into RDF itself.
    RdfBuiltin in "http://www.w3.org/1999/02/22-rdf-syntax-ns#" {
        Html => "HTML",
        XmlLiteral => "XMLLiteral",
        LangString => "langString",
    }
}

// Built-ins that arrived after the enumerations above were frozen. They are
// spilled by IRI, so readers that don't know them still see a plain datatype.
pub const EXTENDED_WELL_KNOWN: &[&str] = &[
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#JSON",
    "http://www.w3.org/1999/02/22-rdf-syntax-ns#dirLangString",
];

lazy_static! {
    static ref WELL_KNOWN_BY_IRI: HashMap<&'static str, Datatype> = {
        let mut lookup = HashMap::new();
        for xsd in Xsd::ALL {
            lookup.insert(xsd.iri(), Datatype::Xsd(*xsd));
        }
        for geo in Geo::ALL {
            lookup.insert(geo.iri(), Datatype::Geo(*geo));
        }
        for rdf in RdfBuiltin::ALL {
            lookup.insert(rdf.iri(), Datatype::Rdf(*rdf));
        }
        for iri in EXTENDED_WELL_KNOWN {
            lookup.insert(*iri, Datatype::ExtendedWellKnown(iri.to_string()));
        }
        lookup
    };
}

// ------------- Datatype -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Datatype {
    Xsd(Xsd),
    Geo(Geo),
    Rdf(RdfBuiltin),
    ExtendedWellKnown(String),
    Other(String),
}

impl Datatype {
    /// Resolves a datatype IRI to its most compact representation.
    pub fn from_iri(iri: &str) -> Self {
        match WELL_KNOWN_BY_IRI.get(iri) {
            Some(datatype) => datatype.clone(),
            None => Datatype::Other(iri.to_string()),
        }
    }
    /// Re-resolves an IRI-carrying datatype so a well-known IRI always ends
    /// up in its enumerated form.
    pub fn canonical(self) -> Self {
        match self {
            Datatype::Other(iri) => Self::from_iri(&iri),
            Datatype::ExtendedWellKnown(iri) => match Self::from_iri(&iri) {
                Datatype::Other(iri) => Datatype::ExtendedWellKnown(iri),
                resolved => resolved,
            },
            enumerated => enumerated,
        }
    }
    pub fn iri(&self) -> &str {
        match self {
            Datatype::Xsd(xsd) => xsd.iri(),
            Datatype::Geo(geo) => geo.iri(),
            Datatype::Rdf(rdf) => rdf.iri(),
            Datatype::ExtendedWellKnown(iri) | Datatype::Other(iri) => iri,
        }
    }
    pub fn is_well_known(&self) -> bool {
        !matches!(self, Datatype::Other(_))
    }
}
impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{}>", self.iri())
    }
}

// ------------- Value -------------
/// A literal is either language tagged or typed, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LiteralKind {
    Language(String),
    Typed(Datatype),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Iri(String),
    BlankNode(String),
    Literal { label: String, kind: LiteralKind },
    Triple(Box<Value>, Box<Value>, Box<Value>),
    Null,
}

impl Value {
    pub fn iri<S: Into<String>>(iri: S) -> Self {
        Value::Iri(iri.into())
    }
    pub fn blank_node<S: Into<String>>(label: S) -> Self {
        Value::BlankNode(label.into())
    }
    /// A plain literal, which is an `xsd:string`.
    pub fn literal<S: Into<String>>(label: S) -> Self {
        Self::typed(label, Datatype::Xsd(Xsd::String))
    }
    pub fn lang_literal<S: Into<String>, L: Into<String>>(label: S, lang: L) -> Self {
        Value::Literal {
            label: label.into(),
            kind: LiteralKind::Language(lang.into()),
        }
    }
    pub fn typed<S: Into<String>>(label: S, datatype: Datatype) -> Self {
        Value::Literal {
            label: label.into(),
            kind: LiteralKind::Typed(datatype.canonical()),
        }
    }
    pub fn typed_literal<S: Into<String>>(label: S, datatype_iri: &str) -> Self {
        Self::typed(label, Datatype::from_iri(datatype_iri))
    }
    pub fn integer(i: i64) -> Self {
        Self::typed(i.to_string(), Datatype::Xsd(Xsd::Integer))
    }
    pub fn triple(subject: Value, predicate: Value, object: Value) -> Self {
        Value::Triple(Box::new(subject), Box::new(predicate), Box::new(object))
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn label(&self) -> Option<&str> {
        match self {
            Value::Literal { label, .. } => Some(label),
            _ => None,
        }
    }
    pub fn language(&self) -> Option<&str> {
        match self {
            Value::Literal {
                kind: LiteralKind::Language(lang),
                ..
            } => Some(lang),
            _ => None,
        }
    }
    pub fn datatype(&self) -> Option<&Datatype> {
        match self {
            Value::Literal {
                kind: LiteralKind::Typed(datatype),
                ..
            } => Some(datatype),
            _ => None,
        }
    }
}
impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Iri(iri) => write!(f, "<{}>", iri),
            Value::BlankNode(label) => write!(f, "_:{}", label),
            Value::Literal {
                label,
                kind: LiteralKind::Language(lang),
            } => write!(f, "{:?}@{}", label, lang),
            Value::Literal {
                label,
                kind: LiteralKind::Typed(datatype),
            } => write!(f, "{:?}^^{}", label, datatype),
            Value::Triple(s, p, o) => write!(f, "<< {} {} {} >>", s, p, o),
            Value::Null => write!(f, "NULL"),
        }
    }
}
