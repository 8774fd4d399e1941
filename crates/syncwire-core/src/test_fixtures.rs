//! Shared demo schema for unit tests: a song catalog with a
//! reference cycle (songs point at artists, artists list their
//! songs), one value proxy, and thread-local stores behind locators.

use crate::{
    domain_entity,
    error::{DomainError, InternalError},
    key::Key,
    model::{MethodModel, MethodReceiver, ParamShape, ReturnShape},
    schema::SchemaRegistry,
    service::{ServiceConfig, ServiceStack},
    traits::{DomainPtr, DomainValue, EntityLocator, IssueSink, ValidateCustom, domain_ptr},
    value::{Value, ValueKind},
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
};

//
// Entities
//

#[derive(Clone, Default)]
pub struct Song {
    pub id: Option<u64>,
    pub version: Option<u64>,
    pub title: String,
    pub plays: u64,
    pub tags: Vec<String>,
    pub artist: Option<DomainPtr>,
    pub inspiration: Option<DomainPtr>,
    pub credit: Option<DomainPtr>,
}

domain_entity! {
    entity Song {
        proxy "demo.SongProxy",
        domain "demo::Song",
        key: id Uint,
        version: version,
        fields {
            id: key Uint,
            version: version,
            title: Text,
            plays: Uint,
            tags: list Text,
            artist: ref "demo.ArtistProxy",
            inspiration: ref "demo.SongProxy",
            credit: ref "demo.CreditProxy"
        }
    }
}

impl ValidateCustom for Song {
    fn validate_custom(&self, ctx: &mut IssueSink) {
        if self.title.is_empty() {
            ctx.issue("title", "must not be empty");
        }
    }
}

#[derive(Clone, Default)]
pub struct Artist {
    pub id: Option<u64>,
    pub version: Option<u64>,
    pub name: String,
    pub songs: Vec<DomainPtr>,
}

domain_entity! {
    entity Artist {
        proxy "demo.ArtistProxy",
        domain "demo::Artist",
        key: id Uint,
        version: version,
        fields {
            id: key Uint,
            version: version,
            name: Text,
            songs: reflist "demo.SongProxy"
        }
    }
}

impl ValidateCustom for Artist {}

#[derive(Clone, Default)]
pub struct Credit {
    pub role: String,
    pub share: f64,
}

domain_entity! {
    value Credit {
        proxy "demo.CreditProxy",
        domain "demo::Credit",
        fields {
            role: Text,
            share: Float
        }
    }
}

impl ValidateCustom for Credit {}

// Deliberately carries the wire separator in its token.
#[derive(Clone, Default)]
pub struct BadToken {
    pub id: Option<u64>,
    pub version: Option<u64>,
}

domain_entity! {
    entity BadToken {
        proxy "demo.Bad-Token",
        domain "demo::BadToken",
        key: id Uint,
        version: version,
        fields {
            id: key Uint,
            version: version
        }
    }
}

impl ValidateCustom for BadToken {}

// Deliberately references a proxy type that is never registered.
#[derive(Clone, Default)]
pub struct Dangling {
    pub id: Option<u64>,
    pub version: Option<u64>,
    pub ghost: Option<DomainPtr>,
}

domain_entity! {
    entity Dangling {
        proxy "demo.DanglingProxy",
        domain "demo::Dangling",
        key: id Uint,
        version: version,
        fields {
            id: key Uint,
            version: version,
            ghost: ref "demo.MissingProxy"
        }
    }
}

impl ValidateCustom for Dangling {}

//
// Stores (thread-local; each test thread gets its own)
//

thread_local! {
    static SONGS: RefCell<BTreeMap<u64, DomainPtr>> = RefCell::new(BTreeMap::new());
    static ARTISTS: RefCell<BTreeMap<u64, DomainPtr>> = RefCell::new(BTreeMap::new());
    static NEXT_ID: Cell<u64> = const { Cell::new(100) };
}

pub fn next_id() -> u64 {
    NEXT_ID.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

pub struct SongStore;

impl SongStore {
    pub fn reset() {
        SONGS.with_borrow_mut(BTreeMap::clear);
    }

    pub fn insert(id: u64, song: DomainPtr) {
        SONGS.with_borrow_mut(|m| {
            m.insert(id, song);
        });
    }

    pub fn remove(id: u64) -> Option<DomainPtr> {
        SONGS.with_borrow_mut(|m| m.remove(&id))
    }

    pub fn all() -> Vec<DomainPtr> {
        SONGS.with_borrow(|m| m.values().cloned().collect())
    }

    pub fn len() -> usize {
        SONGS.with_borrow(BTreeMap::len)
    }
}

impl EntityLocator for SongStore {
    fn create(&self) -> Result<DomainPtr, InternalError> {
        Ok(domain_ptr(Song::default()))
    }

    fn load(&self, key: &Key) -> Result<Option<DomainPtr>, InternalError> {
        let Key::Uint(id) = key else {
            return Ok(None);
        };

        Ok(SONGS.with_borrow(|m| m.get(id).cloned()))
    }
}

pub struct ArtistStore;

impl ArtistStore {
    pub fn reset() {
        ARTISTS.with_borrow_mut(BTreeMap::clear);
    }

    pub fn insert(id: u64, artist: DomainPtr) {
        ARTISTS.with_borrow_mut(|m| {
            m.insert(id, artist);
        });
    }
}

impl EntityLocator for ArtistStore {
    fn create(&self) -> Result<DomainPtr, InternalError> {
        Ok(domain_ptr(Artist::default()))
    }

    fn load(&self, key: &Key) -> Result<Option<DomainPtr>, InternalError> {
        let Key::Uint(id) = key else {
            return Ok(None);
        };

        Ok(ARTISTS.with_borrow(|m| m.get(id).cloned()))
    }
}

pub struct CreditStore;

impl EntityLocator for CreditStore {
    fn create(&self) -> Result<DomainPtr, InternalError> {
        Ok(domain_ptr(Credit::default()))
    }

    fn load(&self, _key: &Key) -> Result<Option<DomainPtr>, InternalError> {
        Ok(None)
    }
}

//
// Methods
//

static FIND_SONG: MethodModel = MethodModel {
    operation: "SongService::findSong",
    receiver: MethodReceiver::Static,
    params: &[ParamShape::Value(ValueKind::Uint)],
    returns: ReturnShape::Proxy("demo.SongProxy"),
};

static FIND_ALL_SONGS: MethodModel = MethodModel {
    operation: "SongService::findAllSongs",
    receiver: MethodReceiver::Static,
    params: &[],
    returns: ReturnShape::ProxyList("demo.SongProxy"),
};

static COUNT_SONGS: MethodModel = MethodModel {
    operation: "SongService::countSongs",
    receiver: MethodReceiver::Static,
    params: &[],
    returns: ReturnShape::Value(ValueKind::Uint),
};

static PERSIST_SONG: MethodModel = MethodModel {
    operation: "SongService::persist",
    receiver: MethodReceiver::Instance("demo.SongProxy"),
    params: &[],
    returns: ReturnShape::Unit,
};

static PLAY_SONG: MethodModel = MethodModel {
    operation: "SongService::play",
    receiver: MethodReceiver::Instance("demo.SongProxy"),
    params: &[],
    returns: ReturnShape::Value(ValueKind::Uint),
};

static REMOVE_SONG: MethodModel = MethodModel {
    operation: "SongService::remove",
    receiver: MethodReceiver::Instance("demo.SongProxy"),
    params: &[],
    returns: ReturnShape::Unit,
};

static FAIL: MethodModel = MethodModel {
    operation: "SongService::fail",
    receiver: MethodReceiver::Static,
    params: &[],
    returns: ReturnShape::Value(ValueKind::Uint),
};

fn uint_arg(args: &[DomainValue], idx: usize) -> Result<u64, DomainError> {
    match args.get(idx) {
        Some(DomainValue::Value(Value::Uint(v))) => Ok(*v),
        other => Err(DomainError::message(format!(
            "expected uint argument at {idx}, found {other:?}"
        ))),
    }
}

fn receiver_ptr(receiver: Option<DomainPtr>) -> Result<DomainPtr, DomainError> {
    receiver.ok_or_else(|| DomainError::message("instance method without receiver"))
}

//
// Registry / service construction
//

pub fn demo_registry() -> SchemaRegistry {
    SongStore::reset();
    ArtistStore::reset();

    SchemaRegistry::builder()
        .entity(Song::MODEL, SongStore)
        .entity(Artist::MODEL, ArtistStore)
        .entity(Credit::MODEL, CreditStore)
        .method(&FIND_SONG, |_recv, args| {
            let id = uint_arg(&args, 0)?;
            let found = SONGS.with_borrow(|m| m.get(&id).cloned());

            Ok(found.map_or(DomainValue::Null, DomainValue::Entity))
        })
        .method(&FIND_ALL_SONGS, |_recv, _args| {
            Ok(DomainValue::List(
                SongStore::all().into_iter().map(DomainValue::Entity).collect(),
            ))
        })
        .method(&COUNT_SONGS, |_recv, _args| {
            let count = u64::try_from(SongStore::len()).unwrap_or(u64::MAX);

            Ok(DomainValue::Value(Value::Uint(count)))
        })
        .method(&PERSIST_SONG, |recv, _args| {
            let ptr = receiver_ptr(recv)?;
            let id = {
                let mut song = ptr.borrow_mut();
                let id = match song.id() {
                    Some(Key::Uint(id)) => id,
                    _ => {
                        let id = next_id();
                        song.set("id", DomainValue::Value(Value::Uint(id)))
                            .map_err(|e| DomainError::message(e.to_string()))?;
                        id
                    }
                };
                let version = song.version().unwrap_or(0) + 1;
                song.set("version", DomainValue::Value(Value::Uint(version)))
                    .map_err(|e| DomainError::message(e.to_string()))?;
                id
            };
            SongStore::insert(id, ptr);

            Ok(DomainValue::Null)
        })
        .method(&PLAY_SONG, |recv, _args| {
            let ptr = receiver_ptr(recv)?;
            let mut song = ptr.borrow_mut();
            let plays = match song.get("plays") {
                Ok(DomainValue::Value(Value::Uint(p))) => p + 1,
                _ => 1,
            };
            song.set("plays", DomainValue::Value(Value::Uint(plays)))
                .map_err(|e| DomainError::message(e.to_string()))?;

            Ok(DomainValue::Value(Value::Uint(plays)))
        })
        .method(&REMOVE_SONG, |recv, _args| {
            let ptr = receiver_ptr(recv)?;
            let id = match ptr.borrow().id() {
                Some(Key::Uint(id)) => id,
                _ => return Err(DomainError::message("cannot remove an unpersisted song")),
            };
            SongStore::remove(id);

            Ok(DomainValue::Null)
        })
        .method(&FAIL, |_recv, _args| {
            Err(DomainError::new("DemoFailure", "induced failure"))
        })
        .build()
        .expect("demo schema should build")
}

pub fn demo_service() -> ServiceStack {
    ServiceStack::new(demo_registry(), ServiceConfig::default())
}

/// A registry with a dangling reference, for validator tests. Skips
/// build-time validation so the validator can be exercised directly.
pub fn dangling_registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .entity(Dangling::MODEL, SongStore)
        .build_unchecked()
        .expect("unchecked build should succeed")
}

//
// Seeding helpers
//

pub fn seed_song(title: &str, version: u64) -> Key {
    let id = next_id();
    let song = Song {
        id: Some(id),
        version: Some(version),
        title: title.to_string(),
        ..Default::default()
    };
    SongStore::insert(id, domain_ptr(song));

    Key::Uint(id)
}

/// Seed a song and its artist, linked in both directions so the
/// object graph contains a cycle.
pub fn seed_song_with_artist(title: &str, artist_name: &str) -> Key {
    let song_id = next_id();
    let artist_id = next_id();

    let song = domain_ptr(Song {
        id: Some(song_id),
        version: Some(1),
        title: title.to_string(),
        ..Default::default()
    });
    let artist = domain_ptr(Artist {
        id: Some(artist_id),
        version: Some(1),
        name: artist_name.to_string(),
        songs: vec![song.clone()],
    });
    song.borrow_mut()
        .set("artist", DomainValue::Entity(artist.clone()))
        .expect("song.artist should accept an artist");

    SongStore::insert(song_id, song);
    ArtistStore::insert(artist_id, artist);

    Key::Uint(song_id)
}
