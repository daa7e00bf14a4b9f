//! WebDAV gateway over `reqwest`.
//!
//! - `PROPFIND` (`Depth: 1`) lists a collection, `Depth: 0` stats a path
//! - `GET` streams an object, `PUT` writes one
//! - `DELETE` removes objects and, recursively, collections
//! - `MKCOL` creates collections one level at a time

use super::{
    ByteStream, GatewayError, GatewayResult, StorageEntry, StorageGateway, path_segments,
};
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, redirect::Policy};
use serde::Deserialize;
use std::{fmt, io};
use tracing::debug;

/// Gateway to a remote WebDAV share.
///
/// Holds one pooled HTTP client for the life of the process; every request
/// carries basic-auth credentials when a username is configured.
#[derive(Clone)]
pub struct WebDavGateway {
    base: Url,
    client: Client,
    username: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for WebDavGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDavGateway")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl WebDavGateway {
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> GatewayResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|err| GatewayError::InvalidResponse(format!("bad WebDAV URL: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(GatewayError::InvalidPath {
                path: base_url.to_string(),
            });
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            // PROPFIND must not be replayed as GET on a 301, so redirects
            // surface as statuses.
            client: Client::builder().redirect(Policy::none()).build()?,
            username: username.filter(|u| !u.is_empty()),
            password,
        })
    }

    fn url_for(&self, path: &str, collection: bool) -> GatewayResult<Url> {
        let segments = path_segments(path)?;
        let mut url = self.base.clone();
        if segments.is_empty() {
            return Ok(url);
        }
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| GatewayError::InvalidPath {
                    path: path.to_string(),
                })?;
            parts.pop_if_empty().extend(&segments);
            if collection {
                parts.push("");
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn propfind(
        &self,
        path: &str,
        depth: &str,
        collection: bool,
    ) -> GatewayResult<MultiStatus> {
        let url = self.url_for(path, collection)?;
        let response = self
            .request(dav_method("PROPFIND")?, url)
            .header("Depth", depth)
            .send()
            .await?;
        let response = check_status("PROPFIND", path, response)?;
        let body = response.bytes().await?;
        quick_xml::de::from_reader(body.reader())
            .map_err(|err| GatewayError::InvalidResponse(format!("PROPFIND `{path}`: {err}")))
    }

    /// Convert a multistatus `href` into a store-relative path with a leading `/`.
    fn relative_path(&self, href: &str) -> GatewayResult<String> {
        let url = self
            .base
            .join(href)
            .map_err(|err| GatewayError::InvalidResponse(format!("bad href `{href}`: {err}")))?;
        let full = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|err| GatewayError::InvalidResponse(format!("bad href `{href}`: {err}")))?;
        let base = percent_decode_str(self.base.path()).decode_utf8_lossy();
        let relative = full
            .strip_prefix(base.as_ref())
            .or_else(|| full.strip_prefix(base.trim_end_matches('/')))
            .unwrap_or(full.as_ref());
        Ok(format!("/{}", relative.trim_matches('/')))
    }

    fn entry_from(&self, response: &PropResponse) -> GatewayResult<StorageEntry> {
        let path = self.relative_path(&response.href)?;
        let prop = response.ok_prop().ok_or_else(|| {
            GatewayError::InvalidResponse(format!("no successful propstat for `{path}`"))
        })?;
        let is_dir = prop.resource_type.collection.is_some();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Ok(StorageEntry {
            name,
            path,
            is_dir,
            size: if is_dir {
                0
            } else {
                prop.content_length.unwrap_or(0)
            },
        })
    }
}

fn dav_method(name: &'static str) -> GatewayResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|err| GatewayError::InvalidResponse(format!("method {name}: {err}")))
}

fn check_status(method: &str, path: &str, response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GatewayError::NotFound {
            path: path.to_string(),
        });
    }
    Err(GatewayError::Status {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
    })
}

fn parent_of(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

#[async_trait]
impl StorageGateway for WebDavGateway {
    fn kind(&self) -> &'static str {
        "webdav"
    }

    async fn read(&self, path: &str) -> GatewayResult<ByteStream> {
        let url = self.url_for(path, false)?;
        let response = self.request(Method::GET, url).send().await?;
        let response = check_status("GET", path, response)?;
        Ok(Box::pin(
            response.bytes_stream().map(|r| r.map_err(io::Error::other)),
        ))
    }

    async fn write(&self, path: &str, data: Bytes) -> GatewayResult<()> {
        let url = self.url_for(path, false)?;
        let mut created_parents = false;
        loop {
            let response = self
                .request(Method::PUT, url.clone())
                .body(data.clone())
                .send()
                .await?;
            match response.status() {
                // Servers disagree on 404 vs 409 for a missing parent collection.
                StatusCode::CONFLICT | StatusCode::NOT_FOUND if !created_parents => {
                    created_parents = true;
                    self.make_dir_all(parent_of(path)).await?;
                }
                _ => {
                    check_status("PUT", path, response)?;
                    debug!(path, bytes = data.len(), "wrote object");
                    return Ok(());
                }
            }
        }
    }

    async fn stat(&self, path: &str) -> GatewayResult<StorageEntry> {
        // Servers answer a collection addressed without its trailing slash
        // with a redirect to the slashed form.
        let status = match self.propfind(path, "0", false).await {
            Err(GatewayError::Status { status, .. }) if (300..400).contains(&status) => {
                debug!(path, status, "stat redirected, retrying as collection");
                self.propfind(path, "0", true).await?
            }
            other => other?,
        };
        let first = status
            .response
            .first()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("empty PROPFIND for `{path}`")))?;
        self.entry_from(first)
    }

    async fn list(&self, dir: &str) -> GatewayResult<Vec<StorageEntry>> {
        let status = self.propfind(dir, "1", true).await?;
        let own = format!("/{}", dir.trim_matches('/'));

        let mut entries = Vec::with_capacity(status.response.len());
        for response in &status.response {
            let entry = self.entry_from(response)?;
            if entry.path == own {
                continue;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn remove(&self, path: &str) -> GatewayResult<()> {
        let url = self.url_for(path, false)?;
        let response = self.request(Method::DELETE, url).send().await?;
        check_status("DELETE", path, response)?;
        debug!(path, "removed object");
        Ok(())
    }

    async fn remove_all(&self, path: &str) -> GatewayResult<()> {
        if path_segments(path)?.is_empty() {
            return Err(GatewayError::InvalidPath {
                path: path.to_string(),
            });
        }
        let url = self.url_for(path, true)?;
        let response = self.request(Method::DELETE, url).send().await?;
        check_status("DELETE", path, response)?;
        debug!(path, "removed collection");
        Ok(())
    }

    async fn make_dir_all(&self, path: &str) -> GatewayResult<()> {
        let segments = path_segments(path)?;
        let mkcol = dav_method("MKCOL")?;
        let mut current = String::new();
        for segment in segments {
            current.push('/');
            current.push_str(segment);

            let url = self.url_for(&current, true)?;
            let response = self.request(mkcol.clone(), url).send().await?;
            match response.status() {
                // 405: the collection already exists.
                StatusCode::METHOD_NOT_ALLOWED => continue,
                _ => {
                    check_status("MKCOL", &current, response)?;
                }
            }
        }
        Ok(())
    }
}

/// Body of a `207 Multi-Status` reply.
#[derive(Debug, Default, Deserialize)]
struct MultiStatus {
    #[serde(default)]
    response: Vec<PropResponse>,
}

#[derive(Debug, Deserialize)]
struct PropResponse {
    href: String,
    #[serde(rename = "propstat", default)]
    prop_stats: Vec<PropStat>,
}

impl PropResponse {
    fn ok_prop(&self) -> Option<&Prop> {
        self.prop_stats
            .iter()
            .find(|ps| ps.status.contains(" 200 "))
            .or_else(|| self.prop_stats.first())
            .map(|ps| &ps.prop)
    }
}

#[derive(Debug, Deserialize)]
struct PropStat {
    #[serde(default)]
    prop: Prop,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct Prop {
    #[serde(rename = "getcontentlength")]
    content_length: Option<u64>,
    #[serde(rename = "resourcetype", default)]
    resource_type: ResourceType,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceType {
    collection: Option<()>,
}
