mod common;

use std::time::Duration;

use futures_util::future::join_all;

use chat_translate::state_machine::Stage;
use chat_translate::translate::{Origin, Route};
use chat_translate::{
    EngineConfig, ProviderKind, TranslateError, TranslationRequest, TranslationResponse,
};
use common::{request, Harness, MockProvider};

fn stages_are_valid(stages: &[Stage]) -> bool {
    stages.first() == Some(&Stage::Init)
        && stages.windows(2).all(|w| w[0].can_transition_to(w[1]))
        && stages.last().is_some_and(|s| s.is_terminal())
}

#[tokio::test]
async fn repeated_text_within_ttl_calls_provider_once() {
    let h = Harness::echoing();
    let cfg = request(ProviderKind::Free, &[], false);

    let first = h.engine.translate("hello there", &cfg).await.unwrap();
    let second = h.engine.translate("hello there", &cfg).await.unwrap();

    assert_eq!(first.translated_text, "free:hello there");
    assert_eq!(second.translated_text, first.translated_text);
    assert_eq!(first.origin, Origin::Dispatched);
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(h.free.call_count(), 1);
    assert_eq!(
        second.stages,
        vec![Stage::Init, Stage::Preprocess, Stage::CacheCheck, Stage::Done]
    );
    assert!(stages_are_valid(&first.stages));
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_one_dispatch() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "free:"),
        MockProvider::new(ProviderKind::KeyedA, "a:").with_delay(Duration::from_millis(200)),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );
    let cfg = request(ProviderKind::KeyedA, &["k0"], true);

    let results = join_all((0..8).map(|_| h.engine.translate("so hype right now", &cfg))).await;

    assert_eq!(h.keyed_a.call_count(), 1);
    assert_eq!(h.free.call_count(), 0);
    let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert!(results
        .iter()
        .all(|r| r.translated_text == "a:so hype right now"));
    assert_eq!(
        results.iter().filter(|r| r.origin == Origin::Dispatched).count(),
        1
    );
    assert_eq!(results.iter().filter(|r| r.origin == Origin::Joined).count(), 7);
    assert!(results.iter().all(|r| stages_are_valid(&r.stages)));
    assert_eq!(h.engine.in_flight(), 0);
    assert_eq!(h.engine.metrics().count("coalesced"), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_identical_requests_never_dispatch_twice() {
    for round in 0..2000 {
        let h = Harness::echoing();
        let cfg = request(ProviderKind::Free, &[], false);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let engine = h.engine.clone();
            let cfg = cfg.clone();
            tasks.spawn(async move { engine.translate("same text", &cfg).await });
        }
        while let Some(joined) = tasks.join_next().await {
            let r = joined.unwrap().unwrap();
            assert_eq!(r.translated_text, "free:same text");
            assert!(stages_are_valid(&r.stages));
        }

        assert_eq!(
            h.free.call_count(),
            1,
            "round {round}: more than one provider call for one key"
        );
        assert_eq!(h.engine.in_flight(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn keyed_a_budget_redirects_overflow_to_free() {
    for credentials in [vec!["k0"], vec!["k0", "k1"]] {
        let h = Harness::echoing();
        let cfg = request(ProviderKind::KeyedA, &credentials, false);
        let budget = 15 * credentials.len();

        for i in 0..budget {
            let r = h.engine.translate(&format!("message {i}"), &cfg).await.unwrap();
            assert_eq!(r.served_by, Some(ProviderKind::KeyedA));
        }
        let over = h.engine.translate("one too many", &cfg).await.unwrap();
        assert_eq!(over.served_by, Some(ProviderKind::Free));
        assert_eq!(over.route, Some(Route::RateRedirect));
        assert_eq!(over.translated_text, "free:one too many");
        assert!(stages_are_valid(&over.stages));
        assert!(!over.stages.contains(&Stage::ProviderCall));

        assert_eq!(h.keyed_a.call_count(), budget);
        assert_eq!(h.free.call_count(), 1);

        // the window slides: a minute later KeyedA is admitted again
        tokio::time::advance(Duration::from_secs(60)).await;
        let later = h.engine.translate("a minute later", &cfg).await.unwrap();
        assert_eq!(later.served_by, Some(ProviderKind::KeyedA));
    }
}

#[tokio::test]
async fn credentials_rotate_regardless_of_outcome() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "free:"),
        MockProvider::new(ProviderKind::KeyedA, "a:").failing_on("bad"),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );
    let cfg = request(ProviderKind::KeyedA, &["k0", " ", "k1"], false);

    let texts = ["first bad", "second", "third bad", "fourth", "fifth"];
    for text in texts {
        let _ = h.engine.translate(text, &cfg).await;
    }

    let used: Vec<_> = h.keyed_a.credentials().into_iter().flatten().collect();
    assert_eq!(used, vec!["k0", "k1", "k0", "k1", "k0"]);
    assert_eq!(h.free.call_count(), 0);
}

#[tokio::test]
async fn dictionary_prefers_longest_match_and_runs_after_normalization() {
    let h = Harness::echoing();
    let mut cfg = request(ProviderKind::Free, &[], false);
    cfg.dictionary = "good game,GG\ngame,X".into();

    let r = h.engine.translate("good game", &cfg).await.unwrap();
    assert_eq!(r.translated_text, "free:GG");

    // "gg" expands to "good game" first, then the dictionary maps it back
    h.engine.translate("ggggg lol", &cfg).await.unwrap();
    h.engine.translate("soooo nice😂", &cfg).await.unwrap();
    assert_eq!(h.free.texts(), vec!["GG", "GG haha", "soo nice 😂"]);
}

#[tokio::test]
async fn cache_key_is_the_raw_text() {
    let h = Harness::echoing();
    let mut cfg = request(ProviderKind::Free, &[], false);
    cfg.dictionary = "hello,A".into();
    let first = h.engine.translate("hello", &cfg).await.unwrap();

    cfg.dictionary = "hello,B".into();
    let second = h.engine.translate("hello", &cfg).await.unwrap();

    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.translated_text, first.translated_text);
    assert_eq!(h.free.call_count(), 1);
}

#[tokio::test]
async fn keyed_b_without_credential_fails_without_any_call() {
    for fallback in [false, true] {
        let h = Harness::echoing();
        let cfg = request(ProviderKind::KeyedB, &["   "], fallback);

        let err = h.engine.translate("hello there", &cfg).await.unwrap_err();
        assert_eq!(err, TranslateError::ConfigurationMissing(ProviderKind::KeyedB));
        assert_eq!(h.keyed_b.call_count(), 0);
        assert_eq!(h.free.call_count(), 0);
    }

    let h = Harness::echoing();
    let response = h
        .engine
        .handle(TranslationRequest {
            text: "hello there".into(),
            config: request(ProviderKind::KeyedB, &[], false),
        })
        .await;
    assert!(matches!(response, TranslationResponse::Failure { .. }));
}

#[tokio::test]
async fn keyed_a_without_credential_is_not_retried() {
    let h = Harness::echoing();
    let cfg = request(ProviderKind::KeyedA, &[], true);
    let err = h.engine.translate("hello there", &cfg).await.unwrap_err();
    assert_eq!(err, TranslateError::ConfigurationMissing(ProviderKind::KeyedA));
    assert_eq!(h.free.call_count(), 0);
}

#[tokio::test]
async fn malformed_keyed_a_reply_falls_back_to_free_once() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "free:"),
        MockProvider::new(ProviderKind::KeyedA, "a:")
            .failing(TranslateError::MalformedResponse("no candidate text".into())),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );
    let cfg = request(ProviderKind::KeyedA, &["k0"], true);

    let r = h.engine.translate("hello there", &cfg).await.unwrap();
    assert_eq!(r.translated_text, "free:hello there");
    assert_eq!(r.served_by, Some(ProviderKind::Free));
    assert_eq!(r.route, Some(Route::Fallback));
    assert!(r.stages.contains(&Stage::FallbackCheck));
    assert!(stages_are_valid(&r.stages));
    assert_eq!(h.keyed_a.call_count(), 1);
    assert_eq!(h.free.call_count(), 1);
    assert_eq!(h.engine.metrics().count("fallback"), 1);

    // the fallback result is cached like any other
    let again = h.engine.translate("hello there", &cfg).await.unwrap();
    assert_eq!(again.origin, Origin::Cache);
    assert_eq!(h.free.call_count(), 1);
}

#[tokio::test]
async fn disabled_fallback_propagates_primary_error() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "free:"),
        MockProvider::new(ProviderKind::KeyedA, "a:"),
        MockProvider::new(ProviderKind::KeyedB, "b:")
            .failing(TranslateError::Transport("HTTP status 456".into())),
    );
    let cfg = request(ProviderKind::KeyedB, &["key:fx"], false);

    let err = h.engine.translate("hello there", &cfg).await.unwrap_err();
    assert_eq!(err, TranslateError::Transport("HTTP status 456".into()));
    assert_eq!(h.keyed_b.credentials(), vec![Some("key:fx".to_string())]);
    assert_eq!(h.free.call_count(), 0);
}

#[tokio::test]
async fn free_failure_is_final() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "free:")
            .failing(TranslateError::Transport("HTTP status 429".into())),
        MockProvider::new(ProviderKind::KeyedA, "a:")
            .failing(TranslateError::Transport("HTTP status 500".into())),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );

    let err = h
        .engine
        .translate("hello there", &request(ProviderKind::Free, &[], true))
        .await
        .unwrap_err();
    assert_eq!(err, TranslateError::Transport("HTTP status 429".into()));
    assert_eq!(h.free.call_count(), 1);

    let err = h
        .engine
        .translate("general kenobi", &request(ProviderKind::KeyedA, &["k0"], true))
        .await
        .unwrap_err();
    assert_eq!(err, TranslateError::Transport("HTTP status 429".into()));
    assert_eq!(h.keyed_a.call_count(), 1);
    assert_eq!(h.free.call_count(), 2);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "free:")
            .failing(TranslateError::Transport("offline".into())),
        MockProvider::new(ProviderKind::KeyedA, "a:"),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );
    let cfg = request(ProviderKind::Free, &[], false);
    assert!(h.engine.translate("hello there", &cfg).await.is_err());
    assert!(h.engine.translate("hello there", &cfg).await.is_err());
    assert_eq!(h.free.call_count(), 2);
    assert_eq!(h.engine.cache_len(), 0);
}

#[tokio::test]
async fn output_is_postprocessed() {
    let h = Harness::new(
        MockProvider::new(ProviderKind::Free, "配信ありがとうございます "),
        MockProvider::new(ProviderKind::KeyedA, "a:"),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );
    let r = h
        .engine
        .translate("great stream", &request(ProviderKind::Free, &[], false))
        .await
        .unwrap();
    assert_eq!(r.translated_text, "配信ありがとう great stream");
}

#[tokio::test]
async fn empty_text_is_rejected_up_front() {
    let h = Harness::echoing();
    let err = h
        .engine
        .translate("   ", &request(ProviderKind::Free, &[], true))
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::InvalidInput(_)));
    assert_eq!(h.free.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let h = Harness::echoing();
    let cfg = request(ProviderKind::Free, &[], false);

    h.engine.translate("hello there", &cfg).await.unwrap();
    tokio::time::advance(Duration::from_millis(299_000)).await;
    assert_eq!(
        h.engine.translate("hello there", &cfg).await.unwrap().origin,
        Origin::Cache
    );

    tokio::time::advance(Duration::from_millis(2_000)).await;
    let r = h.engine.translate("hello there", &cfg).await.unwrap();
    assert_eq!(r.origin, Origin::Dispatched);
    assert_eq!(h.free.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn sweeper_clears_expired_entries_without_lookups() {
    let config = EngineConfig {
        cache_ttl_ms: 300_000,
        cache_sweep_interval_ms: 60_000,
        ..EngineConfig::default()
    };
    let h = Harness::with_config(
        config,
        MockProvider::new(ProviderKind::Free, "free:"),
        MockProvider::new(ProviderKind::KeyedA, "a:"),
        MockProvider::new(ProviderKind::KeyedB, "b:"),
    );
    let sweeper = h.engine.spawn_sweeper();
    let cfg = request(ProviderKind::Free, &[], false);
    for text in ["one message", "two messages"] {
        h.engine.translate(text, &cfg).await.unwrap();
    }
    assert_eq!(h.engine.cache_len(), 2);

    tokio::time::sleep(Duration::from_secs(361)).await;
    assert_eq!(h.engine.cache_len(), 0);
    assert_eq!(h.engine.metrics().count("cache_swept"), 2);

    h.engine.shutdown();
    sweeper.await.unwrap();
}

#[tokio::test]
async fn dictionary_changes_take_effect_and_can_be_invalidated() {
    let h = Harness::echoing();
    let mut cfg = request(ProviderKind::Free, &[], false);
    cfg.dictionary = "pog,すごい".into();
    h.engine.translate("pog moment", &cfg).await.unwrap();

    cfg.dictionary = "pog,やばい".into();
    h.engine.translate("pog again", &cfg).await.unwrap();

    h.engine.invalidate_dictionary();
    h.engine.translate("pog once more", &cfg).await.unwrap();

    assert_eq!(
        h.free.texts(),
        vec!["すごい moment", "やばい again", "やばい once more"]
    );
}

#[tokio::test]
async fn latency_histograms_are_recorded_per_stage() {
    let h = Harness::echoing();
    let cfg = request(ProviderKind::Free, &[], false);
    h.engine.translate("how long did that take", &cfg).await.unwrap();
    h.engine.translate("how long did that take", &cfg).await.unwrap();

    let summary = h.engine.metrics().summary();
    assert_eq!(summary["t_preprocess"].count, 2);
    assert_eq!(summary["t_provider_call"].count, 1);
    assert_eq!(summary["t_translate_done"].count, 1);
}
