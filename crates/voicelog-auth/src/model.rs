/// How the caller proved its identity. Gateway entry points always carry a
/// bearer JWT; callable-style embeddings may hand over an already-verified
/// subject instead and skip token parsing.
#[derive(Clone, Debug)]
pub enum AuthnInput {
    BearerJwt(String),
    PreVerified(voicelog_types::prelude::Subject),
}
