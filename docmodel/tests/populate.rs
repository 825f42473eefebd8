use docmodel::{
    bson::{Bson, Document, doc},
    memory::InMemoryStore,
    prelude::*,
    uuid::Uuid,
};
use pretty_assertions::assert_eq;

struct Blog {
    authors: Model<InMemoryStore>,
    posts: Model<InMemoryStore>,
}

async fn blog() -> Blog {
    let store = DocumentStore::new(InMemoryStore::new());

    let authors = store
        .model(
            "authors",
            Schema::builder()
                .field("name", FieldRule::string().required())
                .field("mentor", FieldRule::reference("authors"))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let posts = store
        .model(
            "posts",
            Schema::builder()
                .field("title", FieldRule::string().required())
                .field("author", FieldRule::reference("authors"))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    Blog { authors, posts }
}

fn key(document: &Document) -> String {
    document.document_id().unwrap().to_string()
}

#[tokio::test]
async fn references_resolve_to_the_stored_document() {
    let blog = blog().await;
    let ada = blog.authors.create(doc! { "name": "Ada" }).await.unwrap();
    let post = blog
        .posts
        .create(doc! { "title": "Engines", "author": key(&ada) })
        .await
        .unwrap();

    let populated = blog
        .posts
        .find_by_id(post.document_id().unwrap())
        .populate("author")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(populated.get_document("author").unwrap(), &ada);
    assert_eq!(populated.get_str("title").unwrap(), "Engines");
}

#[tokio::test]
async fn dangling_references_become_null() {
    let blog = blog().await;
    let post = blog
        .posts
        .create(doc! { "title": "Orphan", "author": Uuid::new_v4().to_string() })
        .await
        .unwrap();

    let populated = blog.posts.populate(post, "author").await.unwrap();

    assert_eq!(populated.get("author"), Some(&Bson::Null));
}

#[tokio::test]
async fn unset_references_are_left_alone() {
    let blog = blog().await;
    let post = blog.posts.create(doc! { "title": "Anonymous" }).await.unwrap();

    let populated = blog.posts.populate(post.clone(), "author").await.unwrap();

    assert_eq!(populated, post);
}

#[tokio::test]
async fn resolve_tells_cleared_references_from_dangling_ones() {
    let blog = blog().await;
    let ada = blog.authors.create(doc! { "name": "Ada" }).await.unwrap();
    let cleared = blog
        .posts
        .create(doc! { "title": "Cleared", "author": key(&ada) })
        .await
        .unwrap();
    let dangling = blog
        .posts
        .create(doc! { "title": "Dangling", "author": Uuid::new_v4().to_string() })
        .await
        .unwrap();

    let cleared = blog
        .posts
        .find_by_id_and_update(cleared.document_id().unwrap(), doc! { "author": Bson::Null }, ReturnDocument::After)
        .await
        .unwrap()
        .unwrap();

    let populated_cleared = blog.posts.populate(cleared.clone(), "author").await.unwrap();
    let populated_dangling = blog.posts.populate(dangling.clone(), "author").await.unwrap();
    assert_eq!(populated_cleared.get("author"), populated_dangling.get("author"));

    let resolver = ReferenceResolver::new(blog.posts.backend(), blog.posts.schema());
    assert_eq!(resolver.resolve(&cleared, "author").await.unwrap(), Resolution::Unset);
    assert!(matches!(
        resolver.resolve(&dangling, "author").await.unwrap(),
        Resolution::NotFound(_)
    ));
}

#[tokio::test]
async fn population_is_a_single_hop() {
    let blog = blog().await;
    let grace = blog.authors.create(doc! { "name": "Grace" }).await.unwrap();
    let ada = blog
        .authors
        .create(doc! { "name": "Ada", "mentor": key(&grace) })
        .await
        .unwrap();
    blog.posts
        .create(doc! { "title": "Engines", "author": key(&ada) })
        .await
        .unwrap();

    let posts = blog.posts.find(()).populate("author").await.unwrap();
    let author = posts[0].get_document("author").unwrap();

    assert_eq!(author.get_str("mentor").unwrap(), key(&grace));
}

#[tokio::test]
async fn many_documents_share_one_lookup() {
    let blog = blog().await;
    let ada = blog.authors.create(doc! { "name": "Ada" }).await.unwrap();
    let missing = Uuid::new_v4().to_string();

    blog.posts
        .create_many([
            doc! { "title": "One", "author": key(&ada) },
            doc! { "title": "Two", "author": key(&ada) },
            doc! { "title": "Three", "author": missing.as_str() },
        ])
        .await
        .unwrap();

    let posts = blog.posts.find(()).await.unwrap();
    let populated = blog.posts.populate_many(posts, "author").await.unwrap();

    assert_eq!(populated[0].get_document("author").unwrap(), &ada);
    assert_eq!(populated[1].get_document("author").unwrap(), &ada);
    assert_eq!(populated[2].get("author"), Some(&Bson::Null));
}

#[tokio::test]
async fn only_reference_fields_can_be_populated() {
    let blog = blog().await;
    let post = blog.posts.create(doc! { "title": "Engines" }).await.unwrap();

    let error = blog.posts.populate(post, "title").await.unwrap_err();

    assert!(matches!(error, DocumentStoreError::InvalidQuery(_)));
}

#[tokio::test]
async fn resolver_reports_what_it_found() {
    let blog = blog().await;
    let ada = blog.authors.create(doc! { "name": "Ada" }).await.unwrap();
    let missing = Uuid::new_v4().to_string();
    let resolver = ReferenceResolver::new(blog.posts.backend(), blog.posts.schema());

    assert_eq!(resolver.target("author").unwrap(), "authors");
    assert_eq!(
        resolver.resolve(&doc! { "author": key(&ada) }, "author").await.unwrap(),
        Resolution::Found(ada)
    );
    assert_eq!(
        resolver.resolve(&doc! { "author": missing.as_str() }, "author").await.unwrap(),
        Resolution::NotFound(missing)
    );
    assert_eq!(resolver.resolve(&doc! {}, "author").await.unwrap(), Resolution::Unset);
}

#[tokio::test]
async fn reference_fields_must_hold_identity_keys() {
    let blog = blog().await;

    let error = blog
        .posts
        .create(doc! { "title": "Engines", "author": "ada" })
        .await
        .unwrap_err();

    assert_eq!(error.validation_errors().unwrap().errors()[0].kind, FieldErrorKind::Type);
}
