mod app;
mod bridge;
mod components;

use leptos::*;

fn main() {
    mount_to_body(|| view! { <app::App/> })
}
