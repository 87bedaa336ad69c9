//! Shared v2 wrapping flow: token generation, signing, and re-wrap.

use bytes::Bytes;
use keyloom_codec::{CodecError, EncryptedToken, KeyCodec, Signature};
use keyloom_core::{KeyError, OrganizationKey};

use crate::token::TokenSource;

/// Result of wrapping one private key under a fresh token.
pub(crate) struct TokenWrap {
    pub token: EncryptedToken,
    pub signature: Signature,
    pub org_signature: Option<Signature>,
    pub wrapped_private_key: Bytes,
}

/// Wrap `key_pair` under a fresh random token.
///
/// The token is signed by the user key and, for managed members, by the
/// organization key with an independent signature, so either key alone can
/// validate authenticity. It is then encrypted to both public halves and
/// used as the wrapping passphrase. A decrypt-back check guards against a
/// backend producing a token nobody can open.
pub(crate) async fn token_wrap_key<C: KeyCodec>(
    codec: &C,
    tokens: &TokenSource,
    key_pair: &C::KeyPair,
    primary_user_key: &C::KeyPair,
    organization_key: Option<&OrganizationKey<C::KeyPair>>,
) -> Result<TokenWrap, KeyError> {
    let token = tokens.fresh_token();

    let signature = codec.sign_detached(token.expose().as_bytes(), primary_user_key).await?;
    let org_signature = match organization_key {
        Some(org) => Some(codec.sign_detached(token.expose().as_bytes(), &org.key_pair).await?),
        None => None,
    };

    let mut recipients = vec![primary_user_key.clone()];
    if let Some(org) = organization_key {
        recipients.push(org.key_pair.clone());
    }
    let encrypted_token = codec.encrypt_token(&token, &recipients).await?;

    // Sanity check: the token must decrypt back before anything is wrapped
    // under it.
    let decrypted = codec.decrypt_token(&encrypted_token, primary_user_key).await?;
    if decrypted != token {
        return Err(KeyError::Codec(CodecError::TokenRoundTrip));
    }

    let wrapped_private_key = codec.wrap(key_pair, token.expose()).await?;

    Ok(TokenWrap { token: encrypted_token, signature, org_signature, wrapped_private_key })
}
