//! Blocking HTTP adapter for the Clash of Clans API.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use war_core::{ProviderError, WarProvider, WarRef};
use war_schema::{ClanProfileData, LeagueGroupData, WarData};

const BODY_SNIPPET: usize = 512;

pub struct CocApi {
    http: Client,
    base_url: String,
    token: String,
}

impl CocApi {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(target: "war_monitor::http", url = %url, "provider.request");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        decode_response(status, &body)
    }
}

/// Map a raw response onto the typed result: non-2xx statuses become
/// [`ProviderError::Status`], undecodable bodies [`ProviderError::Malformed`].
pub fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ProviderError> {
    if !(200..300).contains(&status) {
        let detail: String = body.chars().take(BODY_SNIPPET).collect();
        return Err(ProviderError::Status { status, detail });
    }
    Ok(serde_json::from_str(body)?)
}

/// Tags start with `#`, which must be escaped inside a path segment.
pub fn encode_tag(tag: &str) -> String {
    tag.trim().to_uppercase().replace('#', "%23")
}

impl WarProvider for CocApi {
    fn fetch_war(&self, war: &WarRef) -> Result<WarData, ProviderError> {
        match war {
            WarRef::ClanCurrentWar(clan) => {
                self.get(&format!("/clans/{}/currentwar", encode_tag(clan)))
            }
            WarRef::LeagueWar(tag) => {
                self.get(&format!("/clanwarleagues/wars/{}", encode_tag(tag)))
            }
        }
    }

    fn fetch_league_group(&self, clan_tag: &str) -> Result<LeagueGroupData, ProviderError> {
        self.get(&format!(
            "/clans/{}/currentwar/leaguegroup",
            encode_tag(clan_tag)
        ))
    }

    fn fetch_clan_profile(&self, clan_tag: &str) -> Result<ClanProfileData, ProviderError> {
        self.get(&format!("/clans/{}", encode_tag(clan_tag)))
    }
}
