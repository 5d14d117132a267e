use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The output path template failed to compile or render.
    #[display("invalid output path template")]
    Template,
    #[display("could not read the vault")]
    Vault,
    /// The cache store failed during maintenance.
    #[display("cache store failure")]
    Cache,
    /// The batch was aborted; the error tree holds the reason.
    #[display("conversion aborted")]
    Pipeline,
}
