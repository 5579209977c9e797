//! Catalog service client and in-memory implementation.
//!
//! The catalog owns showtimes, movies, seats, screens and theaters. The
//! payment saga only reads them to describe the ticket on the checkout page.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MovieId, ScreenId, SeatId, ShowtimeId, TheaterId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{read_error, url_join};
use crate::error::ServiceClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub movie_id: MovieId,
    pub screen_id: ScreenId,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub screen_id: ScreenId,
    /// Printed seat label, e.g. `F7`.
    pub no: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub id: ScreenId,
    pub theater_id: TheaterId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theater {
    pub id: TheaterId,
    pub name: String,
}

/// Read-only client for the catalog service.
///
/// Every lookup fails with `ServiceClientError::NotFound` for unknown ids.
#[async_trait]
pub trait CatalogServiceClient: Send + Sync {
    async fn get_showtime(&self, id: ShowtimeId) -> Result<Showtime, ServiceClientError>;

    async fn get_movie(&self, id: MovieId) -> Result<Movie, ServiceClientError>;

    async fn get_seat(&self, id: SeatId) -> Result<Seat, ServiceClientError>;

    async fn get_screen(&self, id: ScreenId) -> Result<Screen, ServiceClientError>;

    async fn get_theater(&self, id: TheaterId) -> Result<Theater, ServiceClientError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    showtimes: HashMap<ShowtimeId, Showtime>,
    movies: HashMap<MovieId, Movie>,
    seats: HashMap<SeatId, Seat>,
    screens: HashMap<ScreenId, Screen>,
    theaters: HashMap<TheaterId, Theater>,
}

/// In-memory catalog for development and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

fn not_found(entity: &'static str, id: i64) -> ServiceClientError {
    ServiceClientError::NotFound { entity, id }
}

impl InMemoryCatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_showtime(&self, showtime: Showtime) {
        self.write().showtimes.insert(showtime.id, showtime);
    }

    pub fn add_movie(&self, movie: Movie) {
        self.write().movies.insert(movie.id, movie);
    }

    pub fn add_seat(&self, seat: Seat) {
        self.write().seats.insert(seat.id, seat);
    }

    pub fn add_screen(&self, screen: Screen) {
        self.write().screens.insert(screen.id, screen);
    }

    pub fn add_theater(&self, theater: Theater) {
        self.write().theaters.insert(theater.id, theater);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryCatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogServiceClient for InMemoryCatalogService {
    async fn get_showtime(&self, id: ShowtimeId) -> Result<Showtime, ServiceClientError> {
        self.read()
            .showtimes
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("showtime", id.as_i64()))
    }

    async fn get_movie(&self, id: MovieId) -> Result<Movie, ServiceClientError> {
        self.read()
            .movies
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("movie", id.as_i64()))
    }

    async fn get_seat(&self, id: SeatId) -> Result<Seat, ServiceClientError> {
        self.read()
            .seats
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("seat", id.as_i64()))
    }

    async fn get_screen(&self, id: ScreenId) -> Result<Screen, ServiceClientError> {
        self.read()
            .screens
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("screen", id.as_i64()))
    }

    async fn get_theater(&self, id: TheaterId) -> Result<Theater, ServiceClientError> {
        self.read()
            .theaters
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("theater", id.as_i64()))
    }
}

/// Catalog client speaking JSON over HTTP: `GET {base}/{collection}/{id}`.
#[derive(Debug, Clone)]
pub struct HttpCatalogServiceClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogServiceClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        entity: &'static str,
        id: i64,
    ) -> Result<T, ServiceClientError> {
        let response = self
            .client
            .get(url_join(&self.base_url, &format!("{collection}/{id}")))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(not_found(entity, id)),
            s if s.is_success() => Ok(response.json().await?),
            _ => Err(read_error(response).await),
        }
    }
}

#[async_trait]
impl CatalogServiceClient for HttpCatalogServiceClient {
    async fn get_showtime(&self, id: ShowtimeId) -> Result<Showtime, ServiceClientError> {
        self.fetch("showtimes", "showtime", id.as_i64()).await
    }

    async fn get_movie(&self, id: MovieId) -> Result<Movie, ServiceClientError> {
        self.fetch("movies", "movie", id.as_i64()).await
    }

    async fn get_seat(&self, id: SeatId) -> Result<Seat, ServiceClientError> {
        self.fetch("seats", "seat", id.as_i64()).await
    }

    async fn get_screen(&self, id: ScreenId) -> Result<Screen, ServiceClientError> {
        self.fetch("screens", "screen", id.as_i64()).await
    }

    async fn get_theater(&self, id: TheaterId) -> Result<Theater, ServiceClientError> {
        self.fetch("theaters", "theater", id.as_i64()).await
    }
}
