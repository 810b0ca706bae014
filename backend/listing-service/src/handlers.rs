/// Listing and link HTTP handlers
///
/// Read routes serve ranked listings from the cache. Write routes go through
/// the link cache, which enqueues the listing updates.
use actix_web::{delete, get, post, web, HttpResponse};
use ranked_cache::{Link, SortMode, TimeWindow};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::db::NewLink;
use crate::error::{AppError, Result};
use crate::listings::{Listing, ListingService, Page};

/// Query parameters shared by listing routes
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    /// Time window: "day", "week", "month", "year", "all"
    pub t: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FrontPageQuery {
    /// Comma separated feed ids
    #[serde(default)]
    pub feeds: String,
    pub t: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub sort: SortMode,
    pub window: TimeWindow,
    pub offset: usize,
    pub total: usize,
    pub count: usize,
    pub links: Vec<Link>,
}

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            sort: listing.sort,
            window: listing.window,
            offset: listing.offset,
            total: listing.total,
            count: listing.links.len(),
            links: listing.links,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub delta: i64,
}

fn parse_feed_ids(raw: &str) -> Result<Vec<Uuid>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| AppError::BadRequest(format!("invalid feed id: {}", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(AppError::BadRequest("feeds must name at least one feed".into()));
    }
    Ok(ids)
}

/// GET /api/v1/feeds/{feed_id}/{sort}
#[get("/api/v1/feeds/{feed_id}/{sort}")]
pub async fn get_feed_listing(
    path: web::Path<(String, String)>,
    query: web::Query<ListingQuery>,
    service: web::Data<ListingService>,
) -> Result<HttpResponse> {
    let (feed_id, sort) = path.into_inner();
    let feed_id = Uuid::parse_str(&feed_id)
        .map_err(|_| AppError::BadRequest(format!("invalid feed id: {}", feed_id)))?;
    let sort = service.parse_sort(&sort)?;
    let window = service.parse_window(query.t.as_deref())?;
    let page = Page::new(query.offset, query.limit);

    debug!(%feed_id, %sort, %window, "Feed listing request");

    let listing = service.feed_listing(feed_id, sort, window, page).await?;
    Ok(HttpResponse::Ok().json(ListingResponse::from(listing)))
}

/// GET /api/v1/listings/{sort}?feeds=a,b
///
/// Combined listing across several feeds.
#[get("/api/v1/listings/{sort}")]
pub async fn get_front_page(
    path: web::Path<String>,
    query: web::Query<FrontPageQuery>,
    service: web::Data<ListingService>,
) -> Result<HttpResponse> {
    let feed_ids = parse_feed_ids(&query.feeds)?;
    let sort = service.parse_sort(&path.into_inner())?;
    let window = service.parse_window(query.t.as_deref())?;
    let page = Page::new(query.offset, query.limit);

    let listing = service.front_page(&feed_ids, sort, window, page).await?;
    Ok(HttpResponse::Ok().json(ListingResponse::from(listing)))
}

/// POST /api/v1/links
#[post("/api/v1/links")]
pub async fn create_link(
    body: web::Json<NewLink>,
    service: web::Data<ListingService>,
) -> Result<HttpResponse> {
    let new_link = body.into_inner();
    if new_link.title.trim().is_empty() || new_link.url.trim().is_empty() {
        return Err(AppError::BadRequest("title and url are required".into()));
    }
    let link = service.links().create(new_link).await?;
    Ok(HttpResponse::Created().json(link))
}

/// GET /api/v1/links/{id}
#[get("/api/v1/links/{id}")]
pub async fn get_link(
    path: web::Path<Uuid>,
    service: web::Data<ListingService>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    match service.links().by_id(id).await? {
        Some(link) => Ok(HttpResponse::Ok().json(link)),
        None => Err(AppError::NotFound(format!("link {}", id))),
    }
}

/// POST /api/v1/links/{id}/vote
#[post("/api/v1/links/{id}/vote")]
pub async fn vote_link(
    path: web::Path<Uuid>,
    body: web::Json<VoteRequest>,
    service: web::Data<ListingService>,
) -> Result<HttpResponse> {
    let link = service.links().vote(path.into_inner(), body.delta).await?;
    Ok(HttpResponse::Ok().json(link))
}

/// DELETE /api/v1/links/{id}
#[delete("/api/v1/links/{id}")]
pub async fn delete_link(
    path: web::Path<Uuid>,
    service: web::Data<ListingService>,
) -> Result<HttpResponse> {
    service.links().remove(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Register the API routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_feed_listing)
        .service(get_front_page)
        .service(create_link)
        .service(get_link)
        .service(vote_link)
        .service(delete_link);
}
