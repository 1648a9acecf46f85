use url::Url;

use crate::error::Error;

/// Options for building URLs from a base URL and path segments.
///
/// The default preserves any existing query/fragment and does not
/// trim trailing empty path segments.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BuildUrlOptions {
    /// When true, clear any existing query string on the base URL.
    pub clear_query: bool,
    /// When true, clear any existing fragment (`#...`) on the base URL.
    pub clear_fragment: bool,
    /// When true, drop a trailing empty path segment before appending segments.
    pub pop_if_empty: bool,
}

impl BuildUrlOptions {
    /// Options used for every management request: the base URL only
    /// contributes scheme, host and path prefix.
    pub const REQUEST: Self = Self {
        clear_query: true,
        clear_fragment: true,
        pop_if_empty: true,
    };
}

pub(crate) fn build_url(
    base_url: &Url,
    segments: &[&str],
    options: BuildUrlOptions,
) -> Result<Url, Error> {
    let mut url = base_url.clone();
    if options.clear_query {
        url.set_query(None);
    }
    if options.clear_fragment {
        url.set_fragment(None);
    }
    {
        let mut path_segments = url
            .path_segments_mut()
            .map_err(|_| Error::InvalidBaseUrl(base_url.to_string()))?;
        if options.pop_if_empty {
            path_segments.pop_if_empty();
        }
        for segment in segments {
            path_segments.push(segment);
        }
    }
    Ok(url)
}
