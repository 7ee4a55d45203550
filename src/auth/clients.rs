use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppError, AppResult, Config, GetField};

pub(crate) type ProviderClient = Client<
    oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
    oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    oauth2::StandardRevocableToken,
    oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub const ALL: [ClientProvider; 2] = [ClientProvider::Google, ClientProvider::Github];

    /// Identity provider id as the token exchange expects it.
    pub fn id(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    pub fn path(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Configured login providers. Without a client secret file there are none
/// and login reports that.
#[derive(Clone, Default)]
pub struct Clients {
    pub(crate) firebase_idpurl: Option<String>,
    google_client: Option<ProviderClient>,
    github_client: Option<ProviderClient>,
}

impl Clients {
    pub fn empty() -> Clients {
        Clients::default()
    }

    pub fn from_json(json: Value, config: &Config) -> AppResult<Clients> {
        let firebase_idpurl = format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={}",
            json.get_obj_field("firebase")?.get_str_field("apikey")?
        );

        let client = |provider: ClientProvider| -> AppResult<Option<ProviderClient>> {
            let Some(json) = json.get(provider.path()) else {
                return Ok(None);
            };
            let (auth_url, token_url) = provider.endpoints();

            Ok(Some(
                BasicClient::new(ClientId::new(json.get_str_field("client_id")?))
                    .set_client_secret(ClientSecret::new(json.get_str_field("client_secret")?))
                    .set_auth_uri(AuthUrl::new(auth_url.to_owned())?)
                    .set_token_uri(TokenUrl::new(token_url.to_owned())?)
                    .set_redirect_uri(RedirectUrl::new(config.redirect_url(provider.path()))?),
            ))
        };

        Ok(Clients {
            firebase_idpurl: Some(firebase_idpurl),
            google_client: client(ClientProvider::Google)?,
            github_client: client(ClientProvider::Github)?,
        })
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<ProviderClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }
        .ok_or_else(|| AppError::not_found(format!("OAuth provider {provider} keys not supplied")))
    }

    pub fn providers(&self) -> Vec<ClientProvider> {
        ClientProvider::ALL
            .into_iter()
            .filter(|p| self.get_client(*p).is_ok())
            .collect()
    }

    pub(crate) fn idp_url(&self) -> AppResult<&str> {
        self.firebase_idpurl
            .as_deref()
            .ok_or_else(|| AppError::not_found("Identity provider not configured"))
    }
}
