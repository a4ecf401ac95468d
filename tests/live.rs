use serde_json::json;
use std::time::Instant;

const BASE_URL: &str = "http://127.0.0.1:3000";
const POSTS: usize = 13;

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn signup_and_login(client: &reqwest::Client) -> (String, String) {
    let username = format!("live_{}", &uuid::Uuid::new_v4().simple().to_string()[0..8]);
    let password = "password123";

    let resp = client
        .post(format!("{}/auth/signup/", BASE_URL))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{}/auth/login/", BASE_URL))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let data: serde_json::Value = resp.json().await.unwrap();
    (username, data["token"].as_str().unwrap().to_string())
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn live_post_and_profile_pages() {
    let client = client();
    let start = Instant::now();
    let (username, token) = signup_and_login(&client).await;

    let resp = client
        .get(format!("{}/create/", BASE_URL))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(
        resp.headers().get("location").unwrap().to_str().unwrap(),
        "/auth/login/?next=/create/"
    );

    for i in 0..POSTS {
        let resp = client
            .post(format!("{}/create/", BASE_URL))
            .bearer_auth(&token)
            .json(&json!({"text": format!("live post {}", i)}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
    }

    let page = client
        .get(format!("{}/profile/{}/?page=2", BASE_URL, username))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(page.matches(r#"<article class="post">"#).count(), POSTS - 10);

    println!("{} posts created and paged in {:?}", POSTS, start.elapsed());
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn live_follow_round_trip() {
    let client = client();
    let (author, _) = signup_and_login(&client).await;
    let (_, token) = signup_and_login(&client).await;

    for action in ["follow", "unfollow"] {
        let resp = client
            .get(format!("{}/profile/{}/{}/", BASE_URL, author, action))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get("location").unwrap().to_str().unwrap(),
            format!("/profile/{}/", author)
        );
    }

    let missing = client
        .get(format!("{}/unexisting_page/", BASE_URL))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
