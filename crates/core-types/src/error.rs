use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Gene '{gene}' value {value} lies outside its declared range [{min}, {max}]")]
    GeneOutOfBounds {
        gene: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Gene '{0}' has no declared range")]
    UndeclaredGene(String),

    #[error("Gene '{0}' is missing from the vector")]
    MissingGene(String),

    #[error("Illegal lifecycle transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}
