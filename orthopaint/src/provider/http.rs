//! HTTP client abstraction for testability

use std::time::Duration;

use super::types::ProviderError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes, or an error for transport failures and
    /// non-success status codes.
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with default configuration.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("orthopaint/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ProviderError::Http(format!("Request failed: {}", e)))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Read response body
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::Http(format!("Failed to read response: {}", e)))
    }
}

/// Append URL-encoded key/value pairs to `base`, keeping any existing query.
pub fn kvp_url(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    if !url.contains('?') {
        url.push('?');
    } else if !url.ends_with('?') && !url.ends_with('&') {
        url.push('&');
    }

    let query: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();
    url.push_str(&query.join("&"));
    url
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock HTTP client for testing
    pub struct MockHttpClient {
        pub response: Result<Vec<u8>, ProviderError>,
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
            self.response.clone()
        }
    }

    /// Mock client answering by URL substring and recording every request.
    ///
    /// Routes are tried in order; the first whose pattern occurs in the URL
    /// wins. Unmatched URLs get the fallback.
    pub struct RoutingHttpClient {
        routes: Vec<(String, Result<Vec<u8>, ProviderError>)>,
        fallback: Result<Vec<u8>, ProviderError>,
        requests: Mutex<Vec<String>>,
    }

    impl RoutingHttpClient {
        pub fn new(fallback: Result<Vec<u8>, ProviderError>) -> Self {
            Self {
                routes: Vec::new(),
                fallback,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn route(mut self, pattern: &str, response: Result<Vec<u8>, ProviderError>) -> Self {
            self.routes.push((pattern.to_string(), response));
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl HttpClient for RoutingHttpClient {
        fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.routes
                .iter()
                .find(|(pattern, _)| url.contains(pattern.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Palette cycled by [`ColorTileClient`].
    pub const TEST_COLORS: [[u8; 3]; 8] = [
        [250, 0, 0],
        [0, 250, 0],
        [0, 0, 250],
        [0, 250, 250],
        [250, 0, 250],
        [250, 250, 0],
        [250, 250, 250],
        [0, 0, 0],
    ];

    /// Test-mode tile source: every request returns a solid PNG tile whose
    /// color cycles through [`TEST_COLORS`].
    pub struct ColorTileClient {
        size: u32,
        counter: AtomicUsize,
    }

    impl ColorTileClient {
        pub fn new(size: u32) -> Self {
            Self {
                size,
                counter: AtomicUsize::new(0),
            }
        }
    }

    impl HttpClient for ColorTileClient {
        fn get(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            Ok(solid_png(self.size, self.size, TEST_COLORS[n % TEST_COLORS.len()]))
        }
    }

    /// Encode a solid-color PNG.
    pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_mock_client_success() {
        let mock = MockHttpClient {
            response: Ok(vec![1, 2, 3, 4]),
        };

        let result = mock.get("http://example.com");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mock_client_error() {
        let mock = MockHttpClient {
            response: Err(ProviderError::Http("Test error".to_string())),
        };

        let result = mock.get("http://example.com");
        assert!(result.is_err());
    }

    #[test]
    fn test_routing_client_records_requests() {
        let client = RoutingHttpClient::new(Ok(vec![0]))
            .route("GetCapabilities", Ok(b"<xml/>".to_vec()));

        assert_eq!(client.get("http://a/?REQUEST=GetCapabilities").unwrap(), b"<xml/>");
        assert_eq!(client.get("http://a/tile").unwrap(), vec![0]);
        assert_eq!(client.request_count(), 2);
    }

    #[test]
    fn test_color_client_cycles() {
        let client = ColorTileClient::new(4);
        let first = image::load_from_memory(&client.get("x").unwrap())
            .unwrap()
            .to_rgb8();
        let second = image::load_from_memory(&client.get("x").unwrap())
            .unwrap()
            .to_rgb8();
        assert_eq!(first.get_pixel(0, 0).0, TEST_COLORS[0]);
        assert_eq!(second.get_pixel(0, 0).0, TEST_COLORS[1]);
    }

    #[test]
    fn test_kvp_url_encodes_values() {
        let url = kvp_url(
            "https://example.com/wmts",
            &[("LAYER", "A B"), ("FORMAT", "image/jpeg")],
        );
        assert_eq!(
            url,
            "https://example.com/wmts?LAYER=A%20B&FORMAT=image%2Fjpeg"
        );
    }

    #[test]
    fn test_kvp_url_keeps_existing_query() {
        let url = kvp_url("https://example.com/wms?map=ortho", &[("SERVICE", "WMS")]);
        assert_eq!(url, "https://example.com/wms?map=ortho&SERVICE=WMS");
    }
}
