use std::collections::HashMap;
use std::sync::OnceLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use rust_embed::RustEmbed;

use crate::core::helpers::{group_url, post_url, profile_url};
use crate::core::pagination::Page;
use crate::forms::FieldErrors;
use crate::models::{Comment, Group, Post, User};

#[derive(RustEmbed)]
#[folder = "templates"]
struct Assets;

/// A post together with what its card shows about author and group.
#[derive(Debug, Clone)]
pub struct PostView {
    pub post: Post,
    pub author: String,
    pub group: Option<Group>,
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub comment: Comment,
    pub author: String,
}

fn load(name: &str) -> anyhow::Result<String> {
    let file = Assets::get(name).ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.into_owned())?)
}

/// Single pass over the template: `{{ key }}` is replaced by the context
/// value (already HTML), unknown keys by nothing. Inserted values are not
/// scanned again.
fn fill(template: &str, context: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        match rest[start..].find("}}") {
            Some(end) => {
                let key = rest[start + 2..start + end].trim();
                if let Some(value) = context.get(key) {
                    out.push_str(value);
                }
                rest = &rest[start + end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn nav(viewer: Option<&User>) -> String {
    match viewer {
        Some(user) => format!(
            r#"<a href="/create/">New post</a> <a href="/follow/">Following</a> <a href="{}">{}</a>"#,
            encode_double_quoted_attribute(&profile_url(&user.username)),
            encode_text(&user.username)
        ),
        None => r#"<a href="/auth/login/">Log in</a>"#.to_string(),
    }
}

fn render(
    name: &str,
    title: &str,
    viewer: Option<&User>,
    context: HashMap<&str, String>,
) -> anyhow::Result<String> {
    let content = fill(&load(name)?, &context);

    let mut base = HashMap::new();
    base.insert("title", encode_text(title).into_owned());
    base.insert("nav", nav(viewer));
    base.insert("content", content);
    Ok(fill(&load("base.html")?, &base))
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("Regex should compile"))
}

/// Escapes post text and turns http(s) URLs into links.
pub fn format_text(text: &str) -> String {
    let escaped = encode_text(text);
    url_regex()
        .replace_all(&escaped, |caps: &regex::Captures| {
            let url = &caps[0];
            format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                url, url
            )
        })
        .replace('\n', "<br>")
}

fn format_date(post: &Post) -> String {
    post.created_at.format("%d %b %Y").to_string()
}

fn image_tag(path: &Option<String>) -> String {
    path.as_ref()
        .map(|p| format!(r#"<img src="/media/{}" alt="">"#, encode_double_quoted_attribute(p)))
        .unwrap_or_default()
}

fn post_card(view: &PostView, show_group: bool) -> String {
    let group = match (&view.group, show_group) {
        (Some(g), true) => format!(
            r#"<a href="{}">all posts of the group {}</a>"#,
            group_url(&g.slug),
            encode_text(&g.title)
        ),
        _ => String::new(),
    };

    format!(
        r#"<article class="post">
  <ul>
    <li>Author: <a href="{author_url}">{author}</a></li>
    <li>Date: {date}</li>
  </ul>
  {image}
  <p>{text}</p>
  <a href="{detail}">details</a>
  {group}
</article>"#,
        author_url = encode_double_quoted_attribute(&profile_url(&view.author)),
        author = encode_text(&view.author),
        date = format_date(&view.post),
        image = image_tag(&view.post.image),
        text = format_text(&view.post.text),
        detail = post_url(view.post.id),
        group = group,
    )
}

fn post_list(page: &Page<PostView>, show_group: bool) -> String {
    if page.is_empty() {
        return "<p>No posts yet.</p>".to_string();
    }
    page.items
        .iter()
        .map(|v| post_card(v, show_group))
        .collect::<Vec<_>>()
        .join("\n<hr>\n")
}

fn paginator<T>(page: &Page<T>) -> String {
    if page.num_pages <= 1 {
        return String::new();
    }
    let mut links = Vec::new();
    if page.has_previous() {
        links.push(r#"<a href="?page=1">first</a>"#.to_string());
        links.push(format!(r#"<a href="?page={}">previous</a>"#, page.number - 1));
    }
    links.push(format!("<span>Page {} of {}</span>", page.number, page.num_pages));
    if page.has_next() {
        links.push(format!(r#"<a href="?page={}">next</a>"#, page.number + 1));
        links.push(format!(r#"<a href="?page={}">last</a>"#, page.num_pages));
    }
    format!(r#"<nav class="pagination">{}</nav>"#, links.join(" "))
}

fn field_errors(errors: &FieldErrors) -> String {
    if errors.is_empty() {
        return String::new();
    }
    let items: Vec<String> = errors
        .iter()
        .flat_map(|(field, messages)| {
            messages
                .iter()
                .map(move |m| format!("<li>{}: {}</li>", encode_text(field), encode_text(m)))
        })
        .collect();
    format!(r#"<ul class="errors">{}</ul>"#, items.join(""))
}

// === Pages ===

pub fn render_index(viewer: Option<&User>, page: &Page<PostView>) -> anyhow::Result<String> {
    let mut ctx = HashMap::new();
    ctx.insert("posts", post_list(page, true));
    ctx.insert("paginator", paginator(page));
    render("index.html", "Latest posts", viewer, ctx)
}

pub fn render_group(viewer: Option<&User>, group: &Group, page: &Page<PostView>) -> anyhow::Result<String> {
    let mut ctx = HashMap::new();
    ctx.insert("group_title", encode_text(&group.title).into_owned());
    ctx.insert("group_description", encode_text(&group.description).into_owned());
    ctx.insert("posts", post_list(page, false));
    ctx.insert("paginator", paginator(page));
    render("group_list.html", &format!("Group {}", group.title), viewer, ctx)
}

/// `following` is `None` when no follow button should be shown (anonymous
/// visitor or own profile).
pub fn render_profile(
    viewer: Option<&User>,
    author: &User,
    page: &Page<PostView>,
    post_count: usize,
    following: Option<bool>,
) -> anyhow::Result<String> {
    let base = profile_url(&author.username);
    let follow_button = match following {
        Some(true) => format!(r#"<a class="button" href="{}unfollow/">Unfollow</a>"#, base),
        Some(false) => format!(r#"<a class="button" href="{}follow/">Follow</a>"#, base),
        None => String::new(),
    };

    let mut ctx = HashMap::new();
    ctx.insert("username", encode_text(&author.username).into_owned());
    ctx.insert("post_count", post_count.to_string());
    ctx.insert("follow_button", follow_button);
    ctx.insert("posts", post_list(page, true));
    ctx.insert("paginator", paginator(page));
    render("profile.html", &format!("Profile of {}", author.username), viewer, ctx)
}

pub fn render_post_detail(
    viewer: Option<&User>,
    view: &PostView,
    post_count: usize,
    comments: &Page<CommentView>,
    can_edit: bool,
) -> anyhow::Result<String> {
    let post = &view.post;
    let group = view
        .group
        .as_ref()
        .map(|g| {
            format!(
                r#"<li>Group: <a href="{}">{}</a></li>"#,
                group_url(&g.slug),
                encode_text(&g.title)
            )
        })
        .unwrap_or_default();

    let edit_link = if can_edit {
        format!(
            r#"<a href="/posts/{id}/edit/">edit</a> <form method="post" action="/posts/{id}/delete/"><button type="submit">delete</button></form>"#,
            id = post.id
        )
    } else {
        String::new()
    };

    let comment_form = if viewer.is_some() {
        format!(
            r#"<form method="post" action="/posts/{}/comment/"><textarea name="text" cols="80" rows="10"></textarea><button type="submit">Send</button></form>"#,
            post.id
        )
    } else {
        String::new()
    };

    let comment_list = comments
        .items
        .iter()
        .map(|c| {
            format!(
                r#"<div class="comment"><h5><a href="{}">{}</a></h5><p>{}</p></div>"#,
                encode_double_quoted_attribute(&profile_url(&c.author)),
                encode_text(&c.author),
                format_text(&c.comment.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut ctx = HashMap::new();
    ctx.insert("created_at", format_date(post));
    ctx.insert("group", group);
    ctx.insert("author_url", encode_double_quoted_attribute(&profile_url(&view.author)).into_owned());
    ctx.insert("author", encode_text(&view.author).into_owned());
    ctx.insert("post_count", post_count.to_string());
    ctx.insert("image", image_tag(&post.image));
    ctx.insert("text", format_text(&post.text));
    ctx.insert("edit_link", edit_link);
    ctx.insert("comment_form", comment_form);
    ctx.insert("comments", comment_list);
    ctx.insert("paginator", paginator(comments));
    render("post_detail.html", &format!("Post {}", post.preview()), viewer, ctx)
}

/// Values shown in the post form.
pub struct PostFormView<'a> {
    pub editing: Option<u64>,
    pub text: &'a str,
    pub group_id: Option<u64>,
    pub groups: &'a [Group],
    pub errors: &'a FieldErrors,
}

pub fn render_post_form(viewer: Option<&User>, form: &PostFormView) -> anyhow::Result<String> {
    let (heading, action, submit) = match form.editing {
        Some(id) => ("Edit post", format!("/posts/{}/edit/", id), "Save"),
        None => ("New post", "/create/".to_string(), "Add"),
    };

    let options = form
        .groups
        .iter()
        .map(|g| {
            let selected = if form.group_id == Some(g.id) { " selected" } else { "" };
            format!(
                r#"    <option value="{}"{}>{}</option>"#,
                g.id,
                selected,
                encode_text(&g.title)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut ctx = HashMap::new();
    ctx.insert("heading", heading.to_string());
    ctx.insert("action", action);
    ctx.insert("submit", submit.to_string());
    ctx.insert("text", encode_text(form.text).into_owned());
    ctx.insert("group_options", options);
    ctx.insert("errors", field_errors(form.errors));
    render("create_post.html", heading, viewer, ctx)
}

pub fn render_follow(viewer: Option<&User>, page: &Page<PostView>) -> anyhow::Result<String> {
    let mut ctx = HashMap::new();
    ctx.insert("posts", post_list(page, true));
    ctx.insert("paginator", paginator(page));
    render("follow.html", "Following", viewer, ctx)
}

pub fn render_login(next: &str, error: Option<&str>) -> anyhow::Result<String> {
    let mut ctx = HashMap::new();
    ctx.insert("next", encode_double_quoted_attribute(next).into_owned());
    ctx.insert(
        "error",
        error
            .map(|e| format!(r#"<p class="error">{}</p>"#, encode_text(e)))
            .unwrap_or_default(),
    );
    render("login.html", "Log in", None, ctx)
}

pub fn render_about(viewer: Option<&User>, topic: &str) -> anyhow::Result<String> {
    match topic {
        "author" => render("about_author.html", "About the author", viewer, HashMap::new()),
        _ => render("about_tech.html", "Technology", viewer, HashMap::new()),
    }
}

pub fn render_not_found() -> String {
    render("404.html", "Page not found", None, HashMap::new())
        .unwrap_or_else(|_| "<h1>Page not found</h1>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn view(text: &str) -> PostView {
        PostView {
            post: Post {
                id: 1,
                text: text.to_string(),
                author_id: 1,
                group_id: None,
                image: None,
                created_at: Utc::now(),
                updated_at: None,
            },
            author: "leo".to_string(),
            group: None,
        }
    }

    #[test]
    fn fill_is_single_pass() {
        let mut ctx = HashMap::new();
        ctx.insert("a", "{{ b }}".to_string());
        ctx.insert("b", "B".to_string());
        assert_eq!(fill("<{{ a }}|{{b}}|{{ missing }}>", &ctx), "<{{ b }}|B|>");
        assert_eq!(fill("dangling {{ open", &ctx), "dangling {{ open");
    }

    #[test]
    fn text_is_escaped_and_linkified() {
        let html = format_text("<script> see https://example.com/x?a=1\nbye");
        assert!(html.starts_with("&lt;script&gt;"));
        assert!(html.contains(r#"<a href="https://example.com/x?a=1""#));
        assert!(html.contains("<br>bye"));
    }

    #[test]
    fn index_lists_posts_and_paginator() {
        let page = Page {
            items: vec![view("hello world")],
            number: 1,
            num_pages: 2,
            total_count: 11,
        };
        let html = render_index(None, &page).unwrap();
        assert!(html.contains("hello world"));
        assert!(html.contains("Page 1 of 2"));
        assert!(html.contains(r#"href="/auth/login/""#));
    }

    #[test]
    fn not_found_page_renders() {
        assert!(render_not_found().contains("Page not found"));
    }
}
