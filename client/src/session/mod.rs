pub mod claims;
pub mod clock;
pub mod guard;
pub mod store;

pub use self::claims::{decode_claims, token_is_live};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::guard::{Access, SessionGuard};
pub use self::store::{FileStore, MemoryStore, SessionKey, SessionStore, StoreError};

use tracing::{info, warn};

use shared::types::{LoginData, LoginError, LoginUser};

use crate::error::{ClientError, ClientResult, Field, FieldErrors};
use crate::gateway::ApiClient;

/// Exchange credentials for a token and persist the session.
pub async fn login(api: &ApiClient, data: &LoginData) -> ClientResult<LoginUser> {
    if let Err(e) = data.validate() {
        warn!("Login rejected before sending: {}", e.to_code());
        let field = match &e {
            LoginError::MissingField(name) if name == "email" => Field::Email,
            _ => Field::Password,
        };
        return Err(ClientError::Validation(FieldErrors::single(
            field,
            e.to_message(),
        )));
    }

    info!("Signing in as {}", data.email);
    let response = api.login(data).await?;

    if response.token.trim().is_empty() {
        warn!("Login answer carried no token");
        return Err(ClientError::Transient(
            LoginError::MissingToken.to_message(),
        ));
    }

    api.session()
        .establish_session(&response.token, response.role(), response.name())?;

    Ok(LoginUser {
        role: response.role().to_string(),
        name: response.name().to_string(),
    })
}

/// Explicit sign-out.
pub fn logout(guard: &SessionGuard) -> ClientResult<()> {
    guard.clear_session()?;
    Ok(())
}
