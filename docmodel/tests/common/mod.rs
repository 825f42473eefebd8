#![allow(dead_code)]

use docmodel::{bson::{Document, doc}, memory::InMemoryStore, prelude::*};
use regex::Regex;

pub fn user_schema() -> Schema {
    Schema::builder()
        .field("name", FieldRule::string().required().min_length(5).max_length(20))
        .field(
            "age",
            FieldRule::number()
                .required()
                .constraint(Constraint::min(18.0).with_message("Age minimum 18 required!"))
                .max(60.0),
        )
        .field(
            "email",
            FieldRule::string()
                .required()
                .unique()
                .constraint(Constraint::pattern(Regex::new(r"^\S+@\S+\.\S+$").unwrap()).with_message("Invalid email format!")),
        )
        .field(
            "role",
            FieldRule::string()
                .default("user")
                .constraint(Constraint::one_of(["admin", "user", "editor"]).with_message("{VALUE} is not a valid role")),
        )
        .build()
        .unwrap()
}

pub fn product_schema() -> Schema {
    Schema::builder()
        .field("name", FieldRule::string().required())
        .field("price", FieldRule::number().required().min(0.0))
        .field("rank", FieldRule::number())
        .build()
        .unwrap()
}

pub fn user(name: &str, age: i32, email: &str) -> Document {
    doc! { "name": name, "age": age, "email": email }
}

pub async fn users() -> Model<InMemoryStore> {
    DocumentStore::new(InMemoryStore::new())
        .model("users", user_schema())
        .await
        .unwrap()
}

/// A product model holding one document per `(name, price)` pair, created in order.
pub async fn products(items: &[(&str, i32)]) -> Model<InMemoryStore> {
    let products = DocumentStore::new(InMemoryStore::new())
        .model("products", product_schema())
        .await
        .unwrap();

    for (rank, (name, price)) in items.iter().enumerate() {
        products
            .create(doc! { "name": *name, "price": *price, "rank": rank as i32 + 1 })
            .await
            .unwrap();
    }

    products
}
