//! Generic search domain: files.

use super::{paths, Domain, PluginType, QueryAddress, Row, Value};

/// File result columns.
pub mod columns {
    pub const ID: &str = "id";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const CONTENT_URI: &str = "content_uri";
    pub const MIME_TYPE: &str = "mime_type";
    pub const SIZE: &str = "size";
    pub const PATH: &str = "path";
    pub const THUMBNAIL_URI: &str = "thumbnail_uri";
    pub const IS_DIRECTORY: &str = "is_directory";
    pub const OWNER: &str = "owner";

    pub const ALL: &[&str] =
        &[ID, DISPLAY_NAME, CONTENT_URI, MIME_TYPE, SIZE, PATH, THUMBNAIL_URI, IS_DIRECTORY, OWNER];
}

/// Default mime type when a plugin does not report one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// File search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub query: String,
}

/// A file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub id: String,
    pub display_name: String,
    pub content_uri: String,
    pub mime_type: Option<String>,
    /// Bytes.
    pub size: Option<i64>,
    pub path: Option<String>,
    pub thumbnail_uri: Option<String>,
    pub is_directory: bool,
    pub owner: Option<String>,
}

impl File {
    /// Mime type, falling back to a generic binary type.
    pub fn mime_type_or_default(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)
    }
}

/// File domain contract.
pub struct FileDomain;

impl Domain for FileDomain {
    type Query = FileQuery;
    type Item = File;

    const PLUGIN_TYPE: PluginType = PluginType::FileSearch;

    fn columns() -> &'static [&'static str] {
        columns::ALL
    }

    fn parse_query(address: &QueryAddress) -> Option<FileQuery> {
        if address.first_segment() != Some(paths::SEARCH) {
            return None;
        }
        Some(FileQuery { query: address.param(super::params::QUERY)?.to_string() })
    }

    fn append_query(address: QueryAddress, query: &FileQuery) -> QueryAddress {
        address.with_param(super::params::QUERY, &query.query)
    }

    fn encode(file: &File) -> Option<Vec<Value>> {
        if file.id.is_empty() || file.content_uri.is_empty() {
            return None;
        }
        Some(vec![
            file.id.as_str().into(),
            file.display_name.as_str().into(),
            file.content_uri.as_str().into(),
            file.mime_type.clone().into(),
            file.size.into(),
            file.path.clone().into(),
            file.thumbnail_uri.clone().into(),
            file.is_directory.into(),
            file.owner.clone().into(),
        ])
    }

    fn decode(row: &Row<'_>) -> Option<File> {
        Some(File {
            id: row.string(columns::ID)?,
            display_name: row.string(columns::DISPLAY_NAME)?,
            content_uri: row.string(columns::CONTENT_URI)?,
            mime_type: row.string(columns::MIME_TYPE),
            size: row.integer(columns::SIZE),
            path: row.string(columns::PATH),
            thumbnail_uri: row.string(columns::THUMBNAIL_URI),
            is_directory: row.boolean(columns::IS_DIRECTORY).unwrap_or(false),
            owner: row.string(columns::OWNER),
        })
    }
}
