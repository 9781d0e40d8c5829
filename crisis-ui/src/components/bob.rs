use chrono::Utc;
use crisis_core::backend;
use crisis_core::validation::MAX_CONTENT_CHARS;
use crisis_core::views::{self, LoadState};
use crisis_core::{BoardColumn, BobBoard, BobEntry, EntryType, HostedClient, TargetSelection};
use leptos::*;
use wasm_bindgen_futures::spawn_local;

#[component]
pub fn BobBoardView() -> impl IntoView {
    let client = store_value(expect_context::<HostedClient>());
    let board = create_rw_signal(LoadState::<BobBoard>::Loading);
    let action_error = create_rw_signal(None::<String>);
    let busy = create_rw_signal(false);

    // Add dialog: open for one column at a time.
    let adding = create_rw_signal(None::<EntryType>);
    let draft = create_rw_signal(String::new());

    // Link dialog: source entry and ticked targets.
    let linking = create_rw_signal(None::<String>);
    let selection = create_rw_signal(TargetSelection::default());

    let load = move || {
        board.set(LoadState::Loading);
        spawn_local(async move {
            let state = match backend::load_board(&client.get_value(), None).await {
                Ok(loaded) => LoadState::Ready(loaded),
                Err(err) => {
                    logging::warn!("{err}");
                    LoadState::Failed(err.to_string())
                }
            };
            board.set(state);
        });
    };

    load();

    let open_add = move |entry_type: EntryType| {
        draft.set(String::new());
        action_error.set(None);
        adding.set(Some(entry_type));
    };

    let open_link = move |entry: &BobEntry| {
        selection.set(TargetSelection::default());
        action_error.set(None);
        linking.set(Some(entry.id.clone()));
    };

    let close_dialogs = move || {
        adding.set(None);
        linking.set(None);
        selection.set(TargetSelection::default());
        action_error.set(None);
    };

    let save_entry = move |_| {
        let Some(entry_type) = adding.get_untracked() else {
            return;
        };
        let content = draft.get_untracked();
        busy.set(true);
        spawn_local(async move {
            match backend::add_entry(&client.get_value(), None, entry_type, &content).await {
                Ok(updated) => {
                    board.set(LoadState::Ready(updated));
                    close_dialogs();
                }
                Err(err) => action_error.set(Some(err.to_string())),
            }
            busy.set(false);
        });
    };

    let save_links = move |_| {
        let Some(from_id) = linking.get_untracked() else {
            return;
        };
        let Some(current) = board.with_untracked(|s| s.ready().cloned()) else {
            return;
        };
        let targets = selection.with_untracked(|s| s.targets().to_vec());
        busy.set(true);
        spawn_local(async move {
            match backend::link_entries(&client.get_value(), &current, None, &from_id, &targets).await {
                Ok(updated) => {
                    board.set(LoadState::Ready(updated));
                    close_dialogs();
                }
                Err(err) => action_error.set(Some(err.to_string())),
            }
            busy.set(false);
        });
    };

    let column_view = move |column: BoardColumn| {
        let entry_type = column.entry_type;
        let now = Utc::now();
        view! {
          <div class="column">
            <div class="row">
              <h3>{column.title}</h3>
              <button on:click=move |_| open_add(entry_type)>"+ Add"</button>
            </div>
            {column
              .cards
              .into_iter()
              .map(|card| {
                let can_link = !card.entry.entry_type.permitted_targets().is_empty();
                let entry = card.entry.clone();
                view! {
                  <div class=if card.has_incoming_links { "card linked" } else { "card" }>
                    <div>{card.entry.content.clone()}</div>
                    <div class="meta" title=views::full_timestamp(card.entry.created_at)>
                      {views::relative_time(card.entry.created_at, now)}
                    </div>
                    {(!card.linked_entries.is_empty()).then(|| view! {
                      <ul class="meta">
                        {card
                          .linked_entries
                          .iter()
                          .map(|linked| view! {
                            <li>{format!("{}: {}", linked.entry_type.column_title(), linked.content)}</li>
                          })
                          .collect_view()}
                      </ul>
                    })}
                    {can_link.then(|| view! {
                      <button on:click=move |_| open_link(&entry)>"Link"</button>
                    })}
                  </div>
                }
              })
              .collect_view()}
          </div>
        }
    };

    let link_dialog = move || {
        let from_id = linking.get()?;
        let targets: Vec<BobEntry> = board.with(|s| {
            let current = s.ready()?;
            let source = current.get(&from_id)?;
            Some(current.link_candidates(source).into_iter().cloned().collect())
        })?;
        Some(view! {
          <div class="dialog">
            <div class="panel stack">
              <h3>"Link entries"</h3>
              {if targets.is_empty() {
                view! { <p class="meta">"No entries available to link."</p> }.into_view()
              } else {
                targets
                  .into_iter()
                  .map(|target| {
                    let checked_id = target.id.clone();
                    let toggle_id = target.id.clone();
                    view! {
                      <label class="row">
                        <input
                          type="checkbox"
                          prop:checked=move || selection.with(|s| s.contains(&checked_id))
                          on:change=move |_| selection.update(|s| s.toggle(&toggle_id))
                        />
                        <span class="badge">{target.entry_type.column_title()}</span>
                        <span>{target.content}</span>
                      </label>
                    }
                  })
                  .collect_view()
              }}
              <Show when=move || action_error.get().is_some()>
                <p class="error">{move || action_error.get().unwrap_or_default()}</p>
              </Show>
              <div class="row">
                <button
                  on:click=save_links
                  disabled=move || busy.get() || selection.with(TargetSelection::is_empty)
                >
                  "Save links"
                </button>
                <button on:click=move |_| close_dialogs()>"Cancel"</button>
              </div>
            </div>
          </div>
        })
    };

    let add_dialog = move || {
        adding.get().map(|entry_type| view! {
          <div class="dialog">
            <div class="panel stack">
              <h3>{entry_type.dialog_title()}</h3>
              <textarea
                rows="4"
                prop:value=move || draft.get()
                on:input=move |ev| draft.set(event_target_value(&ev))
              ></textarea>
              <div class="meta">
                {move || format!("{}/{}", draft.with(|d| d.trim().chars().count()), MAX_CONTENT_CHARS)}
              </div>
              <Show when=move || action_error.get().is_some()>
                <p class="error">{move || action_error.get().unwrap_or_default()}</p>
              </Show>
              <div class="row">
                <button on:click=save_entry disabled=move || busy.get()>"Save"</button>
                <button on:click=move |_| close_dialogs()>"Cancel"</button>
              </div>
            </div>
          </div>
        })
    };

    view! {
      <section class="panel">
        <h2>"BOB Model"</h2>
        {move || match board.get() {
          LoadState::Loading => view! { <p class="meta">"Loading..."</p> }.into_view(),
          LoadState::Failed(message) => view! {
            <p class="error">{message}</p>
            <button on:click=move |_| load()>"Try again"</button>
          }.into_view(),
          LoadState::Ready(current) => view! {
            <div class="columns">
              {current.columns().into_iter().map(column_view).collect_view()}
            </div>
          }.into_view(),
        }}
      </section>
      {add_dialog}
      {link_dialog}
    }
}
