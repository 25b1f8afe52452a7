#![forbid(unsafe_code)]

//! Replaces the database contents with a small demo data set: three users,
//! their channels, a few cross-subscriptions and five videos.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tubeclone::{
    auth::Authenticator,
    config::{SettingsOverrides, resolve_settings},
    logging::init_tracing,
    models::{
        Category, ChannelRecord, DEFAULT_BANNER, SocialLinks, UserRecord, VideoRecord, new_id,
        timestamp_now,
    },
    store::Store,
};

const DEMO_PASSWORD: &str = "password123";

#[derive(Debug, Parser)]
#[command(about = "Wipe the database and load demo users, channels and videos")]
struct SeedArgs {
    /// Database file (overrides DATABASE_PATH).
    #[arg(long)]
    database: Option<PathBuf>,
    /// Dotenv file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

struct DemoUser {
    username: &'static str,
    email: &'static str,
    avatar: &'static str,
}

struct DemoChannel {
    name: &'static str,
    description: &'static str,
    owner: usize,
    subscribers: &'static [usize],
}

struct DemoVideo {
    title: &'static str,
    description: &'static str,
    video_url: &'static str,
    thumbnail_url: &'static str,
    category: Category,
    views: i64,
    likes: i64,
    dislikes: i64,
    duration: i64,
    /// Index into `CHANNELS`; the uploader is that channel's owner.
    channel: usize,
    tags: &'static [&'static str],
}

const USERS: [DemoUser; 3] = [
    DemoUser {
        username: "john_doe",
        email: "john@example.com",
        avatar: "https://randomuser.me/api/portraits/men/32.jpg",
    },
    DemoUser {
        username: "jane_smith",
        email: "jane@example.com",
        avatar: "https://randomuser.me/api/portraits/women/44.jpg",
    },
    DemoUser {
        username: "alex_wong",
        email: "alex@example.com",
        avatar: "https://randomuser.me/api/portraits/men/67.jpg",
    },
];

const CHANNELS: [DemoChannel; 3] = [
    DemoChannel {
        name: "Code with John",
        description: "Learn programming and web development with John Doe",
        owner: 0,
        subscribers: &[1, 2],
    },
    DemoChannel {
        name: "JavaScript Mastery",
        description: "Master JavaScript and modern web technologies",
        owner: 1,
        subscribers: &[0],
    },
    DemoChannel {
        name: "Tech Tutorials",
        description: "Technology tutorials and reviews",
        owner: 2,
        subscribers: &[0, 1],
    },
];

const VIDEOS: [DemoVideo; 5] = [
    DemoVideo {
        title: "Learn React in 30 Minutes",
        description: "A quick tutorial to get started with React. Learn the basics of components, state, and props.",
        video_url: "https://www.youtube.com/embed/dQw4w9WgXcQ",
        thumbnail_url: "https://images.unsplash.com/photo-1633356122544-f134324a6cee?w=320&h=180&fit=crop",
        category: Category::Education,
        views: 15200,
        likes: 1023,
        dislikes: 45,
        duration: 1842,
        channel: 0,
        tags: &["react", "javascript", "web development"],
    },
    DemoVideo {
        title: "JavaScript Fundamentals for Beginners",
        description: "Learn JavaScript basics from scratch. Perfect for absolute beginners.",
        video_url: "https://www.youtube.com/embed/hdI2bqOjy3c",
        thumbnail_url: "https://images.unsplash.com/photo-1627398242454-45a1465c2479?w=320&h=180&fit=crop",
        category: Category::Education,
        views: 25400,
        likes: 1500,
        dislikes: 25,
        duration: 2567,
        channel: 1,
        tags: &["javascript", "programming", "beginner"],
    },
    DemoVideo {
        title: "Building a Full Stack MERN Application",
        description: "Complete tutorial on building a web app with MERN stack (MongoDB, Express, React, Node.js).",
        video_url: "https://www.youtube.com/embed/7CqJlxBYj-M",
        thumbnail_url: "https://images.unsplash.com/photo-1555066931-4365d14bab8c?w=320&h=180&fit=crop",
        category: Category::Technology,
        views: 18500,
        likes: 890,
        dislikes: 12,
        duration: 3245,
        channel: 2,
        tags: &["mern", "fullstack", "nodejs", "react"],
    },
    DemoVideo {
        title: "CSS Grid Tutorial for Beginners",
        description: "Learn how to create modern layouts with CSS Grid.",
        video_url: "https://www.youtube.com/embed/9zBsdzdE4sM",
        thumbnail_url: "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d?w=320&h=180&fit=crop",
        category: Category::Education,
        views: 9800,
        likes: 450,
        dislikes: 8,
        duration: 2150,
        channel: 0,
        tags: &["css", "web design", "frontend"],
    },
    DemoVideo {
        title: "Node.js REST API Tutorial",
        description: "Build a complete REST API with Node.js, Express, and MongoDB.",
        video_url: "https://www.youtube.com/embed/-MTSQjw5DrM",
        thumbnail_url: "https://images.unsplash.com/photo-1614741118887-7a4ee193a5fa?w=320&h=180&fit=crop",
        category: Category::Technology,
        views: 12400,
        likes: 720,
        dislikes: 15,
        duration: 2850,
        channel: 1,
        tags: &["nodejs", "api", "backend"],
    },
];

/// Counts of what was written.
#[derive(Debug, Default, PartialEq, Eq)]
struct SeedSummary {
    users: usize,
    channels: usize,
    videos: usize,
}

async fn seed(store: &Store, auth: &Authenticator) -> Result<SeedSummary> {
    store.clear_all().await?;
    tracing::info!("cleared existing data");

    let password_hash = auth
        .hash_password(DEMO_PASSWORD)
        .await
        .context("hashing demo password")?;

    let mut users = Vec::with_capacity(USERS.len());
    for demo in &USERS {
        let now = timestamp_now();
        let user = UserRecord {
            id: new_id(),
            username: demo.username.to_string(),
            email: demo.email.to_string(),
            password_hash: password_hash.clone(),
            avatar: demo.avatar.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        store
            .insert_user(&user)
            .await
            .with_context(|| format!("creating user {}", demo.username))?;
        tracing::info!(username = demo.username, "created user");
        users.push(user);
    }

    let mut channels = Vec::with_capacity(CHANNELS.len());
    for demo in &CHANNELS {
        let owner = &users[demo.owner];
        let now = timestamp_now();
        let channel = ChannelRecord {
            id: new_id(),
            channel_name: demo.name.to_string(),
            description: demo.description.to_string(),
            owner_id: owner.id.clone(),
            avatar: owner.avatar.clone(),
            banner: DEFAULT_BANNER.to_string(),
            social_links: SocialLinks::default(),
            subscribers: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        store.insert_channel_if_absent(&channel).await?;
        for &subscriber in demo.subscribers {
            store
                .add_subscriber(&channel.id, &users[subscriber].id)
                .await?;
        }
        tracing::info!(channel = demo.name, "created channel");
        channels.push(channel);
    }

    for demo in &VIDEOS {
        let channel = &channels[demo.channel];
        let now = timestamp_now();
        let video = VideoRecord {
            id: new_id(),
            title: demo.title.to_string(),
            description: demo.description.to_string(),
            video_url: demo.video_url.to_string(),
            thumbnail_url: demo.thumbnail_url.to_string(),
            category: demo.category,
            views: demo.views,
            likes: demo.likes,
            dislikes: demo.dislikes,
            duration: demo.duration,
            channel_id: channel.id.clone(),
            uploaded_by: channel.owner_id.clone(),
            is_public: true,
            tags: demo.tags.iter().map(|tag| tag.to_string()).collect(),
            created_at: now.clone(),
            updated_at: now,
        };
        store
            .insert_video(&video)
            .await
            .with_context(|| format!("creating video {}", demo.title))?;
        tracing::info!(title = demo.title, "created video");
    }

    Ok(SeedSummary {
        users: users.len(),
        channels: channels.len(),
        videos: VIDEOS.len(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = SeedArgs::parse();
    let settings = resolve_settings(SettingsOverrides {
        database_path: args.database,
        env_path: args.env_file,
        ..SettingsOverrides::default()
    })?;

    let store = Store::open(&settings.database_path)
        .await
        .with_context(|| format!("opening {}", settings.database_path.display()))?;
    // The seeder never issues tokens, so the secret only has to be non-empty.
    let auth = Authenticator::new("seed", settings.bcrypt_cost);

    let summary = seed(&store, &auth).await?;
    tracing::info!(
        users = summary.users,
        channels = summary.channels,
        videos = summary.videos,
        "seed data created"
    );
    Ok(())
}
