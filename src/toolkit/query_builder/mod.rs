

pub mod builder;
pub mod models;

pub use builder::{select_profile, validate_filters, BuildError, QueryBuilder, QueryBuilderConfig};
pub use models::{
    BuildParams, ExplicitFilter, FilterClause, FilterField, FilterOp, FilterValue, MatchMode,
    RankingProfile, StructuredQuery, TextClause, TextField, VectorClause,
};
