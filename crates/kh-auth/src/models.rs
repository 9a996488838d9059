use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Configuration;
use crate::errors::{AuthError, Result};

/// How a handler obtains tokens, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginType {
    /// Pre-provisioned test account exchanged against `endpoint`
    Automatic {
        credentials: AutomatedCredentials,
        endpoint: Url,
    },
    /// Interactive authorization code flow, persisted under `token_identifier`
    Live {
        configuration: Configuration,
        token_identifier: String,
    },
}

/// OpenID Connect userinfo response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserModel {
    #[serde(default)]
    pub sub: String,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    /// Every claim not listed above
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A test account from the automated-login catalog, tagged by realm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "azureOrDcs", rename_all = "lowercase")]
pub enum AutomatedCredentials {
    Azure(AzureTestUser),
    Dcs(DcsTestUser),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureTestUser {
    pub title: String,
    #[serde(rename = "api-key")]
    pub api_key: String,
    pub client_id: String,
    pub nonce: String,
    pub azure: AzureIdentity,
    pub authorizations: Authorizations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcsTestUser {
    pub title: String,
    #[serde(rename = "api-key")]
    pub api_key: String,
    pub client_id: String,
    pub nonce: String,
    pub dcs: DcsIdentity,
    #[serde(default)]
    pub authorizations: Authorizations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureIdentity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorizations {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcsIdentity {
    #[serde(rename = "authenticatedUser")]
    pub authenticated_user: AuthenticatedUser,
    pub delegator: PartyIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthenticatedUser {
    #[serde(rename = "skatQAALevel")]
    pub skat_qaa_level: String,
    pub e_identifier: String,
    pub type_of_identifier: String,
    pub alternate_identifier: String,
    pub alternate_identifier_type: String,
    pub alternate_name: String,
    #[serde(rename = "legalname")]
    pub legal_name: String,
    pub type_of_actor: String,
    pub type_of_person: String,
    pub country_code: String,
}

/// Delegate or delegator of a DCS account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartyIdentity {
    pub identifier: String,
    pub type_of_identifier: String,
    pub alternate_identifier: String,
    pub alternate_identifier_type: String,
    pub alternate_name: String,
    #[serde(rename = "legalname")]
    pub legal_name: String,
    pub type_of_actor: String,
    pub type_of_person: String,
    pub country_code: String,
}

/// JSON body posted to the automated-login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomatedLoginRequestBody {
    #[serde(rename = "api-key")]
    pub api_key: String,
    pub client_id: String,
    #[serde(rename = "azureOrDcs")]
    pub azure_or_dcs: String,
    pub nonce: String,
    pub azure: AzureIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate: Option<PartyIdentity>,
    pub authorizations: Authorizations,
    #[serde(rename = "authenticatedUser", skip_serializing_if = "Option::is_none")]
    pub authenticated_user: Option<AuthenticatedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegator: Option<PartyIdentity>,
}

impl AutomatedCredentials {
    pub fn title(&self) -> &str {
        match self {
            Self::Azure(user) => &user.title,
            Self::Dcs(user) => &user.title,
        }
    }

    pub fn realm(&self) -> &'static str {
        match self {
            Self::Azure(_) => "azure",
            Self::Dcs(_) => "dcs",
        }
    }

    /// Render the request body for this account.
    ///
    /// DCS accounts send an empty azure identity, an empty delegate and no
    /// roles alongside their authenticated user and delegator.
    pub fn request_body(&self) -> AutomatedLoginRequestBody {
        match self {
            Self::Azure(user) => AutomatedLoginRequestBody {
                api_key: user.api_key.clone(),
                client_id: user.client_id.clone(),
                azure_or_dcs: self.realm().to_string(),
                nonce: user.nonce.clone(),
                azure: user.azure.clone(),
                delegate: None,
                authorizations: user.authorizations.clone(),
                authenticated_user: None,
                delegator: None,
            },
            Self::Dcs(user) => AutomatedLoginRequestBody {
                api_key: user.api_key.clone(),
                client_id: user.client_id.clone(),
                azure_or_dcs: self.realm().to_string(),
                nonce: user.nonce.clone(),
                azure: AzureIdentity::default(),
                delegate: Some(PartyIdentity::default()),
                authorizations: Authorizations::default(),
                authenticated_user: Some(user.dcs.authenticated_user.clone()),
                delegator: Some(user.dcs.delegator.clone()),
            },
        }
    }
}

/// Test accounts shipped alongside an app, plus the endpoint they log in at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedLoginCatalog {
    pub url: String,
    pub users: Vec<AutomatedCredentials>,
}

impl AutomatedLoginCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|_| AuthError::DecodingError)
    }

    pub fn find(&self, title: &str) -> Option<&AutomatedCredentials> {
        self.users.iter().find(|user| user.title() == title)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(AutomatedCredentials::title)
    }

    /// Build an automatic login type for the user named `title`
    pub fn login_type(&self, title: &str) -> Result<LoginType> {
        let credentials = self.find(title).cloned().ok_or(AuthError::InvalidConfiguration)?;
        let endpoint = Url::parse(&self.url).map_err(|_| AuthError::InvalidUrl)?;
        Ok(LoginType::Automatic {
            credentials,
            endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CATALOG: &str = r#"{
        "url": "https://login.test.example/automated",
        "users": [
            {
                "title": "Inspector",
                "azureOrDcs": "azure",
                "api-key": "key-1",
                "client_id": "client-1",
                "nonce": "nonce-1",
                "azure": { "name": "w20", "email": "w20@example.com" },
                "authorizations": { "roles": ["Inspector.Read"] }
            },
            {
                "title": "Citizen",
                "azureOrDcs": "dcs",
                "api-key": "key-2",
                "client_id": "client-2",
                "nonce": "nonce-2",
                "dcs": {
                    "authenticatedUser": {
                        "skatQAALevel": "3",
                        "eIdentifier": "1234",
                        "typeOfIdentifier": "CPR",
                        "alternateIdentifier": "",
                        "alternateIdentifierType": "",
                        "alternateName": "",
                        "legalname": "Jane Doe",
                        "typeOfActor": "Person",
                        "typeOfPerson": "Citizen",
                        "countryCode": "DK"
                    },
                    "delegator": {
                        "identifier": "5678",
                        "typeOfIdentifier": "CVR",
                        "alternateIdentifier": "",
                        "alternateIdentifierType": "",
                        "alternateName": "",
                        "legalname": "Acme",
                        "typeOfActor": "Company",
                        "typeOfPerson": "",
                        "countryCode": "DK"
                    }
                },
                "authorizations": { "roles": [] }
            }
        ]
    }"#;

    #[test]
    fn test_catalog_decodes_both_realms() {
        let catalog = AutomatedLoginCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.titles().collect::<Vec<_>>(), vec!["Inspector", "Citizen"]);
        assert!(matches!(catalog.find("Inspector"), Some(AutomatedCredentials::Azure(_))));
        assert!(matches!(catalog.find("Citizen"), Some(AutomatedCredentials::Dcs(_))));
        assert!(catalog.find("Nobody").is_none());
    }

    #[test]
    fn test_catalog_rejects_unknown_realm() {
        let json = r#"{"url": "https://x", "users": [{"title": "t", "azureOrDcs": "ldap"}]}"#;
        assert_eq!(AutomatedLoginCatalog::from_json(json), Err(AuthError::DecodingError));
    }

    #[test]
    fn test_azure_request_body() {
        let catalog = AutomatedLoginCatalog::from_json(CATALOG).unwrap();
        let body = serde_json::to_value(catalog.find("Inspector").unwrap().request_body()).unwrap();
        assert_eq!(
            body,
            json!({
                "api-key": "key-1",
                "client_id": "client-1",
                "azureOrDcs": "azure",
                "nonce": "nonce-1",
                "azure": { "name": "w20", "email": "w20@example.com" },
                "authorizations": { "roles": ["Inspector.Read"] }
            })
        );
    }

    #[test]
    fn test_dcs_request_body() {
        let catalog = AutomatedLoginCatalog::from_json(CATALOG).unwrap();
        let body = serde_json::to_value(catalog.find("Citizen").unwrap().request_body()).unwrap();

        assert_eq!(body["azureOrDcs"], "dcs");
        assert_eq!(body["azure"], json!({ "name": "", "email": "" }));
        assert_eq!(body["delegate"]["identifier"], "");
        assert_eq!(body["authorizations"]["roles"], json!([]));
        assert_eq!(body["authenticatedUser"]["skatQAALevel"], "3");
        assert_eq!(body["authenticatedUser"]["legalname"], "Jane Doe");
        assert_eq!(body["delegator"]["typeOfIdentifier"], "CVR");
    }

    #[test]
    fn test_login_type_from_catalog() {
        let catalog = AutomatedLoginCatalog::from_json(CATALOG).unwrap();
        match catalog.login_type("Inspector").unwrap() {
            LoginType::Automatic {
                credentials,
                endpoint,
            } => {
                assert_eq!(credentials.title(), "Inspector");
                assert_eq!(endpoint.as_str(), "https://login.test.example/automated");
            }
            other => panic!("unexpected login type: {other:?}"),
        }
        assert_eq!(catalog.login_type("Nobody"), Err(AuthError::InvalidConfiguration));
    }

    #[test]
    fn test_user_model_keeps_extra_claims() {
        let user: UserModel = serde_json::from_value(json!({
            "sub": "abc",
            "name": "Jane Doe",
            "email": "jane@example.com",
            "email_verified": true,
            "realm_access": { "roles": ["admin"] }
        }))
        .unwrap();
        assert_eq!(user.sub, "abc");
        assert_eq!(user.email_verified, Some(true));
        assert!(user.given_name.is_none());
        assert_eq!(user.extra["realm_access"]["roles"][0], "admin");
    }
}
