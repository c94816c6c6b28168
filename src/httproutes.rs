/*
 * Copyright 2025-present ScyllaDB
 * SPDX-License-Identifier: LicenseRef-ScyllaDB-Source-Available-1.0
 */

use crate::categories;
use crate::categories::CategoryInput;
use crate::db::Db;
use crate::posts;
use crate::posts::CreatePost;
use crate::posts::UpdatePost;
use crate::query;
use crate::query::GetPostsParams;
use crate::query::PostPage;
use crate::query::PostView;
use crate::search::SearchIndex;
use crate::search::SearchIndexExt;
use crate::sync::Sync;
use crate::sync::SyncExt;
use crate::BlogError;
use crate::CategoryId;
use crate::CategoryRecord;
use crate::PostId;
use crate::PostRecord;
use crate::StorageUrl;
use axum::extract;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Router;
use tokio::sync::mpsc::Sender;
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

const BLOG_PATH: &str = "/api/v1/blog";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) db: Sender<Db>,
    pub(crate) search: Sender<SearchIndex>,
    pub(crate) sync: Sender<Sync>,
    pub(crate) storage: StorageUrl,
}

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = "blog-search", description = "Blog posts with a search-index backed read path")
    )
)]
struct ApiDoc;

pub(crate) fn new(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(
            OpenApiRouter::new()
                .routes(routes!(get_blog))
                .routes(routes!(get_blog_post))
                .routes(routes!(create_post))
                .routes(routes!(update_post, delete_post))
                .routes(routes!(get_categories, create_category))
                .routes(routes!(update_category, delete_category))
                .routes(routes!(recreate_index))
                .routes(routes!(refresh_index))
                .layer(TraceLayer::new_for_http())
                .with_state(state),
        )
        .split_for_parts();

    router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
}

fn error_response(err: BlogError) -> Response {
    let status = match &err {
        BlogError::PostNotFound(_) | BlogError::CategoryNotFound(_) => StatusCode::NOT_FOUND,
        BlogError::CategoryInUse(_) => StatusCode::CONFLICT,
        BlogError::PostCreation(_) | BlogError::CategoryCreation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        BlogError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if let BlogError::Internal(err) = &err {
        error!("internal error: {err}");
        return (status, "internal error".to_string()).into_response();
    }
    (status, err.to_string()).into_response()
}

#[utoipa::path(
    get,
    path = "/api/v1/blog",
    description = "Published posts from the search index, paginated, optionally filtered \
                   by category and a free-text query",
    params(GetPostsParams),
    responses(
        (status = 200, description = "A page of posts", body = PostPage)
    )
)]
async fn get_blog(
    State(state): State<AppState>,
    Query(params): Query<GetPostsParams>,
) -> response::Json<PostPage> {
    response::Json(query::get_posts(&state.search, &state.storage, BLOG_PATH, params).await)
}

#[utoipa::path(
    get,
    path = "/api/v1/blog/{slug}",
    description = "A single post looked up by slug in the relational store",
    params(
        ("slug" = String, Path, description = "URL-safe post slug")
    ),
    responses(
        (status = 200, description = "The post", body = PostView),
        (status = 404, description = "No post with this slug")
    )
)]
async fn get_blog_post(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    match posts::get_by_slug(&state.db, &slug).await {
        Ok(entry) => response::Json(PostView::from_entry(entry, &state.storage)).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    description = "Create a post and schedule its indexing",
    request_body = CreatePost,
    responses(
        (status = 201, description = "Post created", body = PostRecord),
        (status = 422, description = "Validation failed")
    )
)]
async fn create_post(
    State(state): State<AppState>,
    extract::Json(req): extract::Json<CreatePost>,
) -> Response {
    match posts::create(&state.db, &state.sync, req).await {
        Ok(post) => (StatusCode::CREATED, response::Json(post)).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}",
    description = "Update a post and schedule the index update",
    params(
        ("id" = PostId, Path, description = "Post to update")
    ),
    request_body = UpdatePost,
    responses(
        (status = 200, description = "Post updated", body = PostRecord),
        (status = 404, description = "No such post"),
        (status = 422, description = "Validation failed")
    )
)]
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    extract::Json(req): extract::Json<UpdatePost>,
) -> Response {
    match posts::update(&state.db, &state.sync, id, req).await {
        Ok(post) => response::Json(post).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    description = "Delete a post and schedule the index document removal",
    params(
        ("id" = PostId, Path, description = "Post to delete")
    ),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 404, description = "No such post")
    )
)]
async fn delete_post(State(state): State<AppState>, Path(id): Path<PostId>) -> Response {
    match posts::delete(&state.db, &state.sync, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    description = "List all categories",
    responses(
        (status = 200, description = "All categories", body = [CategoryRecord])
    )
)]
async fn get_categories(State(state): State<AppState>) -> Response {
    match categories::list(&state.db).await {
        Ok(categories) => response::Json(categories).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    description = "Create a category",
    request_body = CategoryInput,
    responses(
        (status = 201, description = "Category created", body = CategoryRecord),
        (status = 422, description = "Validation failed")
    )
)]
async fn create_category(
    State(state): State<AppState>,
    extract::Json(req): extract::Json<CategoryInput>,
) -> Response {
    match categories::create(&state.db, req).await {
        Ok(category) => (StatusCode::CREATED, response::Json(category)).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/categories/{id}",
    description = "Rename a category and schedule the cascade to its posts",
    params(
        ("id" = CategoryId, Path, description = "Category to update")
    ),
    request_body = CategoryInput,
    responses(
        (status = 200, description = "Category updated", body = CategoryRecord),
        (status = 404, description = "No such category"),
        (status = 422, description = "Validation failed")
    )
)]
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
    extract::Json(req): extract::Json<CategoryInput>,
) -> Response {
    match categories::update(&state.db, &state.sync, id, req).await {
        Ok(category) => response::Json(category).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/categories/{id}",
    description = "Delete a category that has no posts",
    params(
        ("id" = CategoryId, Path, description = "Category to delete")
    ),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "No such category"),
        (status = 409, description = "Posts still reference this category")
    )
)]
async fn delete_category(State(state): State<AppState>, Path(id): Path<CategoryId>) -> Response {
    match categories::delete(&state.db, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(serde::Deserialize, utoipa::IntoParams)]
struct RecreateParams {
    /// Run the rebuild in place of scheduling it
    #[serde(default)]
    sync: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/index/recreate",
    description = "Drop and rebuild the search index from the relational store",
    params(RecreateParams),
    responses(
        (status = 200, description = "Index rebuilt"),
        (status = 202, description = "Rebuild scheduled"),
        (status = 500, description = "Rebuild failed")
    )
)]
async fn recreate_index(
    State(state): State<AppState>,
    Query(params): Query<RecreateParams>,
) -> Response {
    if params.sync {
        if state.sync.recreate_index_wait().await {
            (StatusCode::OK, "index recreated").into_response()
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "unable to recreate index").into_response()
        }
    } else {
        state.sync.recreate_index().await;
        (StatusCode::ACCEPTED, "index recreation scheduled").into_response()
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/index/refresh",
    description = "Make recent index writes visible to searches",
    responses(
        (status = 200, description = "Index refreshed"),
        (status = 500, description = "Refresh failed")
    )
)]
async fn refresh_index(State(state): State<AppState>) -> Response {
    if state.search.refresh_index().await {
        (StatusCode::OK, "index refreshed").into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "unable to refresh index").into_response()
    }
}
