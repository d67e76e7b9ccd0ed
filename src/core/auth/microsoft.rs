// ─── Microsoft → Xbox Live → XSTS → Minecraft ───

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{IdentityRecord, MICROSOFT_CLIENT_ID};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::state::Endpoints;

const AUTHORIZE_URL: &str = "https://login.live.com/oauth20_authorize.srf";
pub const REDIRECT_URL: &str = "https://login.live.com/oauth20_desktop.srf";
const SCOPE: &str = "service::user.auth.xboxlive.com::MBI_SSL";

const ENTITLEMENT_NAMES: &[&str] = &["game_minecraft", "product_minecraft"];

/// Hop numbers reported in [`LauncherError::AuthExchange`].
pub const HOP_REDIRECT: u8 = 0;
pub const HOP_XBOX_LIVE: u8 = 1;
pub const HOP_XSTS: u8 = 2;
pub const HOP_MINECRAFT: u8 = 3;
pub const HOP_ENTITLEMENTS: u8 = 4;
pub const HOP_PROFILE: u8 = 5;

/// Tokens carried in the fragment of the desktop redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrosoftTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct XblResponse {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "DisplayClaims", default)]
    display_claims: Option<XuiClaims>,
}

#[derive(Debug, Deserialize)]
struct XuiClaims {
    #[serde(default)]
    xui: Vec<Xui>,
}

#[derive(Debug, Deserialize)]
struct Xui {
    uhs: String,
}

#[derive(Debug, Deserialize)]
struct McLoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct McEntitlements {
    #[serde(default)]
    items: Vec<McEntitlement>,
}

#[derive(Debug, Deserialize)]
struct McEntitlement {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct McProfile {
    pub id: String,
    pub name: String,
}

/// Page the user signs in on.
pub fn authorize_url() -> String {
    // scope contains `::` which the login page expects verbatim
    format!(
        "{}?client_id={}&redirect_uri={}&scope={}&response_type=token",
        AUTHORIZE_URL, MICROSOFT_CLIENT_ID, REDIRECT_URL, SCOPE
    )
}

/// True once the browser has landed on a redirect that carries a token.
pub fn is_token_redirect(url: &str) -> bool {
    url.contains("access_token")
}

/// Pull both tokens out of the redirect fragment, percent-decoded.
pub fn parse_redirect(redirect: &str) -> LauncherResult<MicrosoftTokens> {
    let url = Url::parse(redirect.trim())
        .map_err(|e| LauncherError::auth_hop(HOP_REDIRECT, format!("invalid redirect: {e}")))?;
    let fragment = url
        .fragment()
        .ok_or_else(|| LauncherError::auth_hop(HOP_REDIRECT, "redirect has no fragment"))?;

    let mut access_token = None;
    let mut refresh_token = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            _ => {}
        }
    }

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token))
            if !access_token.is_empty() && !refresh_token.is_empty() =>
        {
            Ok(MicrosoftTokens {
                access_token,
                refresh_token,
            })
        }
        _ => Err(LauncherError::auth_hop(
            HOP_REDIRECT,
            "redirect is missing access_token or refresh_token",
        )),
    }
}

/// Runs the token hops against the configured service hosts.
pub struct XboxExchange {
    client: Client,
    endpoints: Endpoints,
}

impl XboxExchange {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    /// Trade a Microsoft access token for a Minecraft identity.
    ///
    /// `Ok(None)` when the account does not own the game.
    pub async fn authenticate(&self, ms_access_token: &str) -> LauncherResult<Option<IdentityRecord>> {
        let mc_access_token = self.minecraft_token(ms_access_token).await?;

        if !self.owns_game(&mc_access_token).await? {
            info!("Account does not own Minecraft");
            return Ok(None);
        }

        let profile = self.profile(&mc_access_token).await?;
        info!("Signed in as {}", profile.name);
        Ok(Some(IdentityRecord {
            access_token: mc_access_token,
            account_id: profile.id,
            display_name: profile.name,
        }))
    }

    /// Hops 1 to 3.
    pub async fn minecraft_token(&self, ms_access_token: &str) -> LauncherResult<String> {
        // 1) Xbox Live user token
        let xbl: XblResponse = self
            .post_json(
                HOP_XBOX_LIVE,
                &format!("{}/user/authenticate", self.endpoints.xbox_user_auth),
                serde_json::json!({
                    "Properties": {
                        "AuthMethod": "RPS",
                        "SiteName": "user.auth.xboxlive.com",
                        "RpsTicket": ms_access_token
                    },
                    "RelyingParty": "http://auth.xboxlive.com",
                    "TokenType": "JWT"
                }),
            )
            .await?;
        debug!("Xbox Live token acquired");

        // 2) XSTS token for the Minecraft relying party
        let xsts: XblResponse = self
            .post_json(
                HOP_XSTS,
                &format!("{}/xsts/authorize", self.endpoints.xsts_auth),
                serde_json::json!({
                    "Properties": {
                        "SandboxId": "RETAIL",
                        "UserTokens": [xbl.token]
                    },
                    "RelyingParty": "rp://api.minecraftservices.com/",
                    "TokenType": "JWT"
                }),
            )
            .await?;

        let uhs = xsts
            .display_claims
            .as_ref()
            .and_then(|claims| claims.xui.first())
            .map(|x| x.uhs.clone())
            .ok_or_else(|| LauncherError::auth_hop(HOP_XSTS, "XSTS response missing user hash"))?;
        debug!("XSTS token acquired");

        // 3) Minecraft access token
        let login: McLoginResponse = self
            .post_json(
                HOP_MINECRAFT,
                &format!(
                    "{}/authentication/login_with_xbox",
                    self.endpoints.minecraft_services
                ),
                serde_json::json!({
                    "identityToken": format!("XBL3.0 x={};{}", uhs, xsts.token)
                }),
            )
            .await?;

        Ok(login.access_token)
    }

    pub async fn owns_game(&self, mc_access_token: &str) -> LauncherResult<bool> {
        let entitlements: McEntitlements = self
            .get_bearer(
                HOP_ENTITLEMENTS,
                &format!("{}/entitlements/mcstore", self.endpoints.minecraft_services),
                mc_access_token,
            )
            .await?;

        Ok(entitlements
            .items
            .iter()
            .any(|item| ENTITLEMENT_NAMES.contains(&item.name.as_str())))
    }

    pub async fn profile(&self, mc_access_token: &str) -> LauncherResult<McProfile> {
        self.get_bearer(
            HOP_PROFILE,
            &format!("{}/minecraft/profile", self.endpoints.minecraft_services),
            mc_access_token,
        )
        .await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        hop: u8,
        url: &str,
        body: serde_json::Value,
    ) -> LauncherResult<T> {
        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LauncherError::auth_hop(hop, format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| LauncherError::auth_hop(hop, format!("service returned error: {e}")))?
            .json()
            .await
            .map_err(|e| LauncherError::auth_hop(hop, format!("unreadable response: {e}")))
    }

    async fn get_bearer<T: serde::de::DeserializeOwned>(
        &self,
        hop: u8,
        url: &str,
        token: &str,
    ) -> LauncherResult<T> {
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| LauncherError::auth_hop(hop, format!("request failed: {e}")))?
            .error_for_status()
            .map_err(|e| LauncherError::auth_hop(hop, format!("service returned error: {e}")))?
            .json()
            .await
            .map_err(|e| LauncherError::auth_hop(hop, format!("unreadable response: {e}")))
    }
}
