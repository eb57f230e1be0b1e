//! Entry lifecycle over a [`Storage`] backend.
//!
//! [`ContentManager`] knows the collection registry and the on-storage layout
//! (`{collection}/{slug}/index.md` plus `{collection}/{slug}/images/*`), and
//! nothing about the backend behind the trait object.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use folio_storage::{Action, MessageTemplate, Storage, StorageErrorKind, join_path};

use crate::collection::{Collection, IMAGES_DIR};
use crate::entry::{CREATED_AT, Entry, EntryData, EntryLoad, EntryPage, ListOptions, UPDATED_AT};
use crate::error::ContentError;
use crate::front_matter;
use crate::slug::{sanitize_image_name, slugify, validate_segment};
use crate::sort::{matches_search, sort_entries, value_text};

/// Content entry manager.
///
/// Entries are read fresh from storage on every call; nothing is cached here.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use folio_content::{Collection, ContentManager, EntryData, ListOptions};
///
/// let manager = ContentManager::new(storage).with_collection(Collection::new("posts", "posts"));
/// let entry = manager.create_entry("posts", EntryData::default().with_field("title", "Hello"), None)?;
/// let page = manager.list_entries("posts", &ListOptions::default())?;
/// ```
pub struct ContentManager {
    storage: Arc<dyn Storage>,
    collections: BTreeMap<String, Collection>,
    messages: MessageTemplate,
}

impl ContentManager {
    /// Create a manager with no collections and the default message template.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            collections: BTreeMap::new(),
            messages: MessageTemplate::default(),
        }
    }

    /// Register a collection, replacing any with the same name.
    #[must_use]
    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collections.insert(collection.name.clone(), collection);
        self
    }

    /// Set the default commit message template.
    #[must_use]
    pub fn with_message_template(mut self, messages: MessageTemplate) -> Self {
        self.messages = messages;
        self
    }

    /// Storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Registered collections, ordered by name.
    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    /// Look up a collection.
    pub fn collection(&self, name: &str) -> Result<&Collection, ContentError> {
        self.collections
            .get(name)
            .ok_or_else(|| ContentError::CollectionNotFound(name.to_owned()))
    }

    /// Storage directory of an entry.
    pub fn entry_dir(&self, collection: &str, slug: &str) -> Result<String, ContentError> {
        let collection = self.collection(collection)?;
        check_slug(slug)?;
        Ok(collection.entry_dir(slug))
    }

    /// Load every subdirectory of a collection.
    ///
    /// Directories that do not hold a readable entry come back as
    /// [`EntryLoad::Skipped`]. A collection whose directory does not exist yet
    /// yields nothing.
    pub fn scan_collection(&self, name: &str) -> Result<Vec<EntryLoad>, ContentError> {
        let collection = self.collection(name)?;
        let children = match self.storage.read_directory(&collection.path) {
            Ok(children) => children,
            Err(e) if e.kind == StorageErrorKind::NotFound => {
                debug!(collection = name, "Collection directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(children
            .into_iter()
            .filter(|child| child.is_directory)
            .map(|child| self.load_entry(collection, &child.name))
            .collect())
    }

    /// List entries with search, sort and pagination.
    ///
    /// `total` counts every match before pagination.
    pub fn list_entries(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<EntryPage, ContentError> {
        let mut entries: Vec<Entry> = self
            .scan_collection(collection)?
            .into_iter()
            .filter_map(EntryLoad::entry)
            .collect();

        if let Some(search) = &options.search {
            entries.retain(|entry| matches_search(entry, search));
        }
        sort_entries(&mut entries, &options.sort_by, options.sort_order);

        let page = options.page.max(1);
        let limit = options.limit.max(1);
        let total = entries.len();
        let entries = entries
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(EntryPage {
            entries,
            total,
            page,
            limit,
        })
    }

    /// Read one entry. Returns `Ok(None)` if it does not exist.
    pub fn get_entry(&self, collection: &str, slug: &str) -> Result<Option<Entry>, ContentError> {
        let collection = self.collection(collection)?;
        check_slug(slug)?;
        self.read_entry(collection, slug)
    }

    /// Create an entry whose slug is derived from the collection's slug field.
    ///
    /// Writes `index.md` and creates the sibling `images` directory.
    pub fn create_entry(
        &self,
        collection: &str,
        data: EntryData,
        message: Option<&str>,
    ) -> Result<Entry, ContentError> {
        let collection = self.collection(collection)?;
        let slug = data
            .fields
            .get(&collection.slug_field)
            .map(|value| slugify(&value_text(value)))
            .unwrap_or_default();
        if slug.is_empty() {
            return Err(ContentError::EmptySlug {
                field: collection.slug_field.clone(),
            });
        }

        if self.storage.exists(&collection.entry_dir(&slug))? {
            return Err(ContentError::AlreadyExists {
                collection: collection.name.clone(),
                slug,
            });
        }

        let now = now();
        let EntryData { mut fields, body } = data;
        strip_timestamps(&mut fields);
        let path = collection.document_path(&slug);
        let document = render_document(&path, &fields, &body, now, now)?;
        let message = self.message(Action::Create, collection, &slug, message);

        self.storage.write_file(&path, &document, Some(&message))?;
        self.storage.create_directory(&collection.images_dir(&slug))?;
        info!(collection = %collection.name, slug = %slug, "Created entry");

        Ok(Entry {
            slug,
            collection: collection.name.clone(),
            fields,
            body,
            file_path: path,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace an entry's fields and body.
    ///
    /// The creation time is kept and the update time always moves forward.
    pub fn update_entry(
        &self,
        collection: &str,
        slug: &str,
        data: EntryData,
        message: Option<&str>,
    ) -> Result<Entry, ContentError> {
        let collection = self.collection(collection)?;
        check_slug(slug)?;
        let existing = self
            .read_entry(collection, slug)?
            .ok_or_else(|| entry_not_found(collection, slug))?;

        let updated_at = now().max(existing.updated_at + Duration::milliseconds(1));
        let EntryData { mut fields, body } = data;
        strip_timestamps(&mut fields);
        let document = render_document(
            &existing.file_path,
            &fields,
            &body,
            existing.created_at,
            updated_at,
        )?;
        let message = self.message(Action::Update, collection, slug, message);

        self.storage
            .write_file(&existing.file_path, &document, Some(&message))?;
        info!(collection = %collection.name, slug, "Updated entry");

        Ok(Entry {
            fields,
            body,
            updated_at,
            ..existing
        })
    }

    /// Delete an entry with all of its assets.
    pub fn delete_entry(
        &self,
        collection: &str,
        slug: &str,
        message: Option<&str>,
    ) -> Result<(), ContentError> {
        let collection = self.collection(collection)?;
        check_slug(slug)?;
        let dir = collection.entry_dir(slug);
        if !self.storage.exists(&dir)? {
            return Err(entry_not_found(collection, slug));
        }

        let message = self.message(Action::Delete, collection, slug, message);
        match self.storage.delete_directory(&dir, Some(&message)) {
            Err(e) if e.kind == StorageErrorKind::NotFound => {
                Err(entry_not_found(collection, slug))
            }
            result => {
                result?;
                info!(collection = %collection.name, slug, "Deleted entry");
                Ok(())
            }
        }
    }

    /// Store an uploaded image below the entry.
    ///
    /// The stored name carries a millisecond timestamp, bumped past any name
    /// already present, so an upload never replaces an existing image.
    /// Returns the stored path relative to the entry directory
    /// (`images/{name}`).
    pub fn save_image(
        &self,
        collection: &str,
        slug: &str,
        filename: &str,
        content: &[u8],
        message: Option<&str>,
    ) -> Result<String, ContentError> {
        let collection = self.collection(collection)?;
        self.require_entry(collection, slug)?;

        let images_dir = collection.images_dir(slug);
        let name = self.unused_image_name(&images_dir, filename, Utc::now().timestamp_millis())?;
        let path = join_path(&images_dir, &name);
        let message = self.message(Action::Update, collection, slug, message);
        self.storage
            .write_binary_file(&path, content, Some(&message))?;
        info!(path = %path, bytes = content.len(), "Saved image");

        Ok(format!("{IMAGES_DIR}/{name}"))
    }

    /// Images stored below an entry, as `images/{name}` paths.
    pub fn list_images(&self, collection: &str, slug: &str) -> Result<Vec<String>, ContentError> {
        let collection = self.collection(collection)?;
        self.require_entry(collection, slug)?;

        let children = match self.storage.read_directory(&collection.images_dir(slug)) {
            Ok(children) => children,
            Err(e) if e.kind == StorageErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(children
            .into_iter()
            .filter(|child| !child.is_directory)
            .map(|child| format!("{IMAGES_DIR}/{}", child.name))
            .collect())
    }

    /// Delete one image. Accepts a bare name or an `images/{name}` path.
    pub fn delete_image(
        &self,
        collection: &str,
        slug: &str,
        filename: &str,
        message: Option<&str>,
    ) -> Result<(), ContentError> {
        let collection = self.collection(collection)?;
        check_slug(slug)?;
        let name = filename
            .strip_prefix(IMAGES_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(filename);
        if !validate_segment(name) {
            return Err(ContentError::InvalidFileName(filename.to_owned()));
        }

        let path = join_path(&collection.images_dir(slug), name);
        let message = self.message(Action::Update, collection, slug, message);
        match self.storage.delete_file(&path, Some(&message)) {
            Err(e) if e.kind == StorageErrorKind::NotFound => Err(ContentError::ImageNotFound {
                collection: collection.name.clone(),
                slug: slug.to_owned(),
                name: name.to_owned(),
            }),
            result => {
                result?;
                info!(path = %path, "Deleted image");
                Ok(())
            }
        }
    }

    fn unused_image_name(
        &self,
        images_dir: &str,
        filename: &str,
        timestamp_ms: i64,
    ) -> Result<String, ContentError> {
        let mut timestamp = timestamp_ms;
        loop {
            let name = sanitize_image_name(filename, timestamp)?;
            if !self.storage.exists(&join_path(images_dir, &name))? {
                return Ok(name);
            }
            debug!(name = %name, "Image name taken");
            timestamp += 1;
        }
    }

    fn require_entry(&self, collection: &Collection, slug: &str) -> Result<(), ContentError> {
        check_slug(slug)?;
        if self.storage.exists(&collection.entry_dir(slug))? {
            Ok(())
        } else {
            Err(entry_not_found(collection, slug))
        }
    }

    fn message(
        &self,
        action: Action,
        collection: &Collection,
        slug: &str,
        message: Option<&str>,
    ) -> String {
        message.map_or_else(
            || self.messages.render(action, &collection.name, slug),
            ToOwned::to_owned,
        )
    }

    fn load_entry(&self, collection: &Collection, slug: &str) -> EntryLoad {
        let skipped = |reason: String| EntryLoad::Skipped {
            slug: slug.to_owned(),
            reason,
        };

        if slug.starts_with('.') {
            return skipped("hidden directory".to_owned());
        }
        match self.read_entry(collection, slug) {
            Ok(Some(entry)) => EntryLoad::Loaded(entry),
            Ok(None) => {
                debug!(collection = %collection.name, slug, "Skipping directory without index.md");
                skipped("missing index.md".to_owned())
            }
            Err(e @ ContentError::FrontMatter { .. }) => {
                warn!(collection = %collection.name, slug, error = %e, "Skipping unparseable entry");
                skipped(e.to_string())
            }
            Err(e) => {
                debug!(collection = %collection.name, slug, error = %e, "Skipping unreadable entry");
                skipped(e.to_string())
            }
        }
    }

    fn read_entry(
        &self,
        collection: &Collection,
        slug: &str,
    ) -> Result<Option<Entry>, ContentError> {
        let path = collection.document_path(slug);
        let Some(text) = self.storage.read_file(&path)? else {
            return Ok(None);
        };
        let (mut fields, body) =
            front_matter::parse(&text).map_err(|message| ContentError::FrontMatter {
                path: path.clone(),
                message,
            })?;

        let created_at = take_timestamp(&mut fields, CREATED_AT);
        let updated_at = take_timestamp(&mut fields, UPDATED_AT);
        let (created_at, updated_at) = match (created_at, updated_at) {
            (Some(created_at), Some(updated_at)) => (created_at, updated_at),
            (created_at, updated_at) => {
                let metadata = self.storage.metadata(&path)?;
                let now = now();
                (
                    created_at
                        .or_else(|| metadata.as_ref().map(|m| m.created_at))
                        .unwrap_or(now),
                    updated_at
                        .or_else(|| metadata.as_ref().map(|m| m.updated_at))
                        .unwrap_or(now),
                )
            }
        };

        Ok(Some(Entry {
            slug: slug.to_owned(),
            collection: collection.name.clone(),
            fields,
            body,
            file_path: path,
            created_at,
            updated_at,
        }))
    }
}

impl fmt::Debug for ContentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentManager")
            .field("backend", &self.storage.backend())
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

fn check_slug(slug: &str) -> Result<(), ContentError> {
    if validate_segment(slug) {
        Ok(())
    } else {
        Err(ContentError::InvalidSlug(slug.to_owned()))
    }
}

fn entry_not_found(collection: &Collection, slug: &str) -> ContentError {
    ContentError::EntryNotFound {
        collection: collection.name.clone(),
        slug: slug.to_owned(),
    }
}

/// Current time at the precision stored in documents.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn strip_timestamps(fields: &mut Map<String, Value>) {
    fields.shift_remove(CREATED_AT);
    fields.shift_remove(UPDATED_AT);
}

/// Remove and parse a timestamp field; values that are not RFC 3339 stay put.
fn take_timestamp(fields: &mut Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let parsed = fields
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
        .with_timezone(&Utc);
    fields.shift_remove(key);
    Some(parsed)
}

fn render_document(
    path: &str,
    fields: &Map<String, Value>,
    body: &str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Result<String, ContentError> {
    let mut document = fields.clone();
    document.insert(
        CREATED_AT.to_owned(),
        Value::String(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    document.insert(
        UPDATED_AT.to_owned(),
        Value::String(updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    front_matter::render(&document, body).map_err(|message| ContentError::FrontMatter {
        path: path.to_owned(),
        message,
    })
}
