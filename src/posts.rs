use spin_sdk::http::{Request, Response};

use crate::core::cache::index_key;
use crate::core::db::EntityStore;
use crate::core::errors::{ApiError, StoreResult};
use crate::core::helpers::{html, is_json, post_url, profile_url, redirect};
use crate::core::pagination::{Page, Paginator};
use crate::core::query_params::{page_param, parse_form_body, parse_query_params};
use crate::feed::{compose_feed, Scope};
use crate::forms::{CommentForm, CommentSubmission, FieldErrors, FormResult, PostForm, PostSubmission};
use crate::guard::{can_edit, check_edit, require_login, Access};
use crate::models::{Post, User};
use crate::templates::{self, CommentView, PostFormView, PostView};
use crate::App;

fn username_of(store: &EntityStore, user_id: u64) -> StoreResult<String> {
    Ok(store
        .get_user(user_id)?
        .map(|u| u.username)
        .unwrap_or_else(|| "unknown".to_string()))
}

pub fn post_view(store: &EntityStore, post: Post) -> StoreResult<PostView> {
    let author = username_of(store, post.author_id)?;
    let group = match post.group_id {
        Some(id) => store.get_group(id)?,
        None => None,
    };
    Ok(PostView { post, author, group })
}

pub fn post_views(store: &EntityStore, page: Page<Post>) -> StoreResult<Page<PostView>> {
    let items = page
        .items
        .into_iter()
        .map(|p| post_view(store, p))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Page {
        items,
        number: page.number,
        num_pages: page.num_pages,
        total_count: page.total_count,
    })
}

fn read_submission(req: &Request) -> Result<PostSubmission, ApiError> {
    if is_json(req) {
        Ok(serde_json::from_slice(req.body())?)
    } else {
        Ok(PostSubmission::from_form(&parse_form_body(req.body())))
    }
}

fn read_comment(req: &Request) -> Result<CommentSubmission, ApiError> {
    if is_json(req) {
        Ok(serde_json::from_slice(req.body())?)
    } else {
        Ok(CommentSubmission::from_form(&parse_form_body(req.body())))
    }
}

fn find_post(app: &App, post_id: u64) -> Result<Post, ApiError> {
    app.store
        .get_post(post_id)?
        .ok_or_else(|| ApiError::NotFound(format!("post {}", post_id)))
}

/// The global feed, served from the page cache when fresh.
pub fn index(app: &App, req: &Request, viewer: Option<&User>) -> Result<Response, ApiError> {
    let params = parse_query_params(req.uri());
    let page = page_param(&params);
    let key = index_key(page, viewer.map(|u| u.id));

    if let Some(body) = app.cache.get(&key) {
        tracing::debug!(%key, "index served from cache");
        return Ok(html(String::from_utf8_lossy(&body).into_owned()));
    }

    let posts = compose_feed(&app.store, &Scope::All, page, app.config.posts_per_page)?;
    let body = templates::render_index(viewer, &post_views(&app.store, posts)?)?;
    app.cache.put(&key, body.clone().into_bytes(), app.config.index_cache_ttl);
    Ok(html(body))
}

pub fn group_posts(
    app: &App,
    req: &Request,
    viewer: Option<&User>,
    slug: &str,
) -> Result<Response, ApiError> {
    let group = app
        .store
        .find_group_by_slug(slug)?
        .ok_or_else(|| ApiError::NotFound(format!("group {}", slug)))?;

    let params = parse_query_params(req.uri());
    let posts = compose_feed(
        &app.store,
        &Scope::ByGroup(group.slug.clone()),
        page_param(&params),
        app.config.posts_per_page,
    )?;
    let body = templates::render_group(viewer, &group, &post_views(&app.store, posts)?)?;
    Ok(html(body))
}

pub fn post_detail(
    app: &App,
    req: &Request,
    viewer: Option<&User>,
    post_id: u64,
) -> Result<Response, ApiError> {
    let post = find_post(app, post_id)?;
    let post_count = app.store.count_posts_by_author(post.author_id)?;
    let editable = can_edit(viewer, &post);

    let params = parse_query_params(req.uri());
    let comments = Paginator::new(app.store.comments_for_post(post_id)?, app.config.posts_per_page)
        .get_page(page_param(&params));
    let items = comments
        .items
        .into_iter()
        .map(|comment| -> StoreResult<CommentView> {
            let author = username_of(&app.store, comment.author_id)?;
            Ok(CommentView { comment, author })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let comments = Page {
        items,
        number: comments.number,
        num_pages: comments.num_pages,
        total_count: comments.total_count,
    };

    let view = post_view(&app.store, post)?;
    let body = templates::render_post_detail(viewer, &view, post_count, &comments, editable)?;
    Ok(html(body))
}

fn render_form(
    app: &App,
    viewer: Option<&User>,
    editing: Option<u64>,
    submission: &PostSubmission,
    errors: &FieldErrors,
) -> Result<Response, ApiError> {
    let groups = app.store.list_groups()?;
    let form = PostFormView {
        editing,
        text: submission.text.as_deref().unwrap_or_default(),
        group_id: submission.group_id(),
        groups: &groups,
        errors,
    };
    Ok(html(templates::render_post_form(viewer, &form)?))
}

pub fn post_create(
    app: &App,
    req: &Request,
    viewer: Option<&User>,
    is_post: bool,
) -> Result<Response, ApiError> {
    let user = match (require_login(viewer, &app.config.login_url, "/create/"), viewer) {
        (Access::Allow, Some(user)) => user,
        (access, _) => {
            tracing::debug!("anonymous post creation redirected to login");
            return Ok(redirect(&access.redirect_target().unwrap_or_default()));
        }
    };

    if !is_post {
        return render_form(app, viewer, None, &PostSubmission::default(), &FieldErrors::new());
    }

    let submission = read_submission(req)?;
    match PostForm::validate(submission.clone(), &app.store)? {
        FormResult::Valid(fields) => {
            app.store.create_post(user.id, fields)?;
            Ok(redirect(&profile_url(&user.username)))
        }
        FormResult::Invalid(errors) => render_form(app, viewer, None, &submission, &errors),
    }
}

pub fn post_edit(
    app: &App,
    req: &Request,
    viewer: Option<&User>,
    post_id: u64,
    is_post: bool,
) -> Result<Response, ApiError> {
    let next = format!("/posts/{}/edit/", post_id);
    if let Some(target) = require_login(viewer, &app.config.login_url, &next).redirect_target() {
        return Ok(redirect(&target));
    }

    let post = find_post(app, post_id)?;
    if let Some(target) = check_edit(viewer, &post, &app.config.login_url, &next).redirect_target() {
        return Ok(redirect(&target));
    }

    if !is_post {
        let current = PostSubmission::from_fields(&post.text, post.group_id);
        return render_form(app, viewer, Some(post_id), &current, &FieldErrors::new());
    }

    let submission = read_submission(req)?;
    match PostForm::validate(submission.clone(), &app.store)? {
        FormResult::Valid(fields) => {
            app.store.update_post(post_id, fields)?;
            Ok(redirect(&post_url(post_id)))
        }
        FormResult::Invalid(errors) => render_form(app, viewer, Some(post_id), &submission, &errors),
    }
}

pub fn post_delete(app: &App, viewer: Option<&User>, post_id: u64) -> Result<Response, ApiError> {
    let next = format!("/posts/{}/", post_id);
    if let Some(target) = require_login(viewer, &app.config.login_url, &next).redirect_target() {
        return Ok(redirect(&target));
    }

    let post = find_post(app, post_id)?;
    match (check_edit(viewer, &post, &app.config.login_url, &next), viewer) {
        (Access::Allow, Some(user)) => {
            app.store.delete_post(post_id)?;
            Ok(redirect(&profile_url(&user.username)))
        }
        (access, _) => Ok(redirect(&access.redirect_target().unwrap_or_else(|| post_url(post_id)))),
    }
}

pub fn add_comment(
    app: &App,
    req: &Request,
    viewer: Option<&User>,
    post_id: u64,
) -> Result<Response, ApiError> {
    let next = format!("/posts/{}/comment/", post_id);
    let user = match (require_login(viewer, &app.config.login_url, &next), viewer) {
        (Access::Allow, Some(user)) => user,
        (access, _) => return Ok(redirect(&access.redirect_target().unwrap_or_default())),
    };

    find_post(app, post_id)?;
    match CommentForm::validate(read_comment(req)?) {
        FormResult::Valid(text) => {
            app.store.create_comment(post_id, user.id, &text)?;
        }
        FormResult::Invalid(errors) => {
            tracing::debug!(post_id, ?errors, "comment rejected");
        }
    }
    Ok(redirect(&post_url(post_id)))
}

/// Serves an uploaded picture.
pub fn media(app: &App, path: &str) -> Result<Response, ApiError> {
    let data = app
        .store
        .load_media(path)?
        .ok_or_else(|| ApiError::NotFound(format!("media {}", path)))?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Ok(Response::builder()
        .status(200)
        .header("Content-Type", mime.as_ref())
        .body(data)
        .build())
}
