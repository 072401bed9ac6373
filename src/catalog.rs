//! Remote file-catalog client.
//!
//! Talks to the observatory catalog service: password grant for a
//! short-lived bearer token, batched resolution of download URLs, and
//! streaming downloads. Token expiry (HTTP 401) is recovered
//! transparently by re-authenticating; everything else burns a bounded
//! retry budget.

use crate::Result;
use anyhow::Context;

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MAX_RETRIES: u32 = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 40;

/// One downloadable file as the catalog describes it. The description is
/// the local filename to save under.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteFile {
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationRecord {
    pub filename: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct CatalogClient {
    agent: ureq::Agent,
    base: String,
    username: String,
    password: String,
    token: String,
}

impl CatalogClient {
    /// Ping the service (it may be cold-starting), then authenticate.
    pub fn connect(base: &str, username: &str, password: &str) -> Result<Self> {
        let agent = ureq::AgentBuilder::new().build();
        log::info!("waiting for catalog service at {base} (may take a while)");
        agent
            .get(base)
            .call()
            .context("catalog service is not responding")?;
        let mut client = Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: String::new(),
        };
        client.authenticate()?;
        Ok(client)
    }

    fn authenticate(&mut self) -> Result<()> {
        log::info!("requesting access token for {}", self.username);
        let resp = self
            .agent
            .post(&format!("{}/api/v1/auth/token", self.base))
            .send_form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("grant_type", "password"),
            ]);
        match resp {
            Ok(resp) => {
                let token: TokenResponse = resp.into_json().context("bad token response")?;
                self.token = token.access_token;
                Ok(())
            }
            Err(ureq::Error::Status(401, _)) => anyhow::bail!("wrong catalog credentials"),
            Err(err) => Err(err).context("token request failed"),
        }
    }

    /// Run one request, re-authenticating on 401 and retrying other
    /// failures until the budget runs out.
    fn call_with_auth<F>(&mut self, request: F) -> Result<ureq::Response>
    where
        F: Fn(&ureq::Agent, &str) -> std::result::Result<ureq::Response, ureq::Error>,
    {
        let mut budget = MAX_RETRIES;
        loop {
            match request(&self.agent, &self.token) {
                Ok(resp) => return Ok(resp),
                Err(err) if budget == 0 => return Err(err).context("catalog request failed"),
                Err(ureq::Error::Status(401, _)) => {
                    log::info!("access token expired, re-authenticating");
                    budget -= 1;
                    self.authenticate()?;
                }
                Err(err) => {
                    budget -= 1;
                    log::warn!("catalog request failed, retrying: {err}");
                }
            }
        }
    }

    pub fn list_observations(&mut self) -> Result<Vec<ObservationRecord>> {
        let url = format!("{}/api/v1/observations", self.base);
        let resp = self.call_with_auth(|agent, token| {
            agent
                .get(&url)
                .set("Authorization", &format!("Bearer {token}"))
                .call()
        })?;
        resp.into_json().context("bad observation list response")
    }

    pub fn find_by_filename(&mut self, filename: &str) -> Result<serde_json::Value> {
        let url = format!("{}/api/v1/observations/by-filename/{filename}", self.base);
        let resp = self.call_with_auth(|agent, token| {
            agent
                .get(&url)
                .set("Authorization", &format!("Bearer {token}"))
                .call()
        })?;
        resp.into_json().context("bad observation response")
    }

    /// Resolve download URLs for a batch of filenames.
    pub fn batch_urls(&mut self, filenames: &[String]) -> Result<Vec<RemoteFile>> {
        let url = format!("{}/api/v1/observations/by-batch-filename/url", self.base);
        let body = serde_json::to_value(filenames)?;
        let resp = self.call_with_auth(move |agent, token| {
            agent
                .post(&url)
                .set("Authorization", &format!("Bearer {token}"))
                .send_json(body.clone())
        })?;
        resp.into_json().context("bad batch url response")
    }

    /// Stream one file to `{name}.part` and rename atomically once
    /// complete, so an interrupted download never leaves a file that
    /// looks finished.
    pub fn download(&self, file: &RemoteFile, dest_dir: &Path) -> Result<PathBuf> {
        let final_path = dest_dir.join(&file.description);
        let part_path = dest_dir.join(format!("{}.part", file.description));
        let resp = self
            .agent
            .get(&file.url)
            .call()
            .with_context(|| format!("download failed: {}", file.description))?;
        let mut out = fs::File::create(&part_path)
            .with_context(|| format!("create {}", part_path.display()))?;
        io::copy(&mut resp.into_reader(), &mut out)
            .with_context(|| format!("write {}", part_path.display()))?;
        fs::rename(&part_path, &final_path)
            .with_context(|| format!("finalize {}", final_path.display()))?;
        Ok(final_path)
    }
}

/// Split a download queue into catalog-sized URL batches.
pub fn chunked(filenames: &[String], size: usize) -> Vec<&[String]> {
    filenames.chunks(size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn batches_split_the_queue() {
        let names: Vec<String> = (0..5).map(|i| format!("f{i}.fits")).collect();
        let batches = chunked(&names, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
        // a zero chunk size must not loop forever
        assert_eq!(chunked(&names, 0).len(), 5);
    }

    #[test]
    fn remote_file_wire_format() {
        let files: Vec<RemoteFile> = serde_json::from_str(
            r#"[{"description":"zb08c_0571_24540.fits","url":"https://example/dl/1"}]"#,
        )
        .unwrap();
        assert_eq!(
            files,
            vec![RemoteFile {
                description: "zb08c_0571_24540.fits".to_string(),
                url: "https://example/dl/1".to_string(),
            }]
        );
    }

    #[test]
    fn token_wire_format() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","token_type":"bearer"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
    }
}
