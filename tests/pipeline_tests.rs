#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use kodegen_release_pipeline::artifact::{ArtifactRef, CHECKSUM_FILE_NAME, ChecksumVerifier, ReleaseManifest};
    use kodegen_release_pipeline::build::{
        Arch, BuildRequest, BuildStep, BuildTarget, NamingRule, NamingTable, Platform,
        PlatformBuilder, SigningCredentials,
    };
    use kodegen_release_pipeline::error::{AggregateError, BuildError, ChecksumError, PublishError, ReleaseError};
    use kodegen_release_pipeline::pipeline::{
        NoopObserver, PipelineSettings, PipelineStage, ReleaseOrchestrator, StageObserver,
    };
    use kodegen_release_pipeline::publish::{
        AuxiliaryFiles, ChannelPublishers, CreatedRelease, DraftRelease, LocalMirror, NightlyPublisher,
        NotesPolicy, PublishReceipt, Publisher, ReleaseAsset, ReleaseHost, ReleaseNotes,
        ReleasePublisher, UploadedAsset,
    };
    use kodegen_release_pipeline::version::{ReleaseChannel, TriggerContext, TriggerKind, VersionResolver};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Writes one small file per architecture, named by the naming table.
    #[derive(Clone, Default)]
    struct FakeBuilder {
        naming: NamingTable,
        failing: Vec<Platform>,
        launched: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    }

    impl FakeBuilder {
        fn failing(platforms: &[Platform]) -> Self {
            Self {
                failing: platforms.to_vec(),
                ..Default::default()
            }
        }
    }

    impl PlatformBuilder for FakeBuilder {
        async fn build(&self, target: BuildTarget, request: BuildRequest) -> Result<Vec<ArtifactRef>, BuildError> {
            self.launched.fetch_add(1, Ordering::SeqCst);
            let platform = target.platform();

            if self.failing.contains(&platform) {
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.finished.fetch_add(1, Ordering::SeqCst);
                return Err(BuildError::Toolchain {
                    platform,
                    arch: target.architectures()[0],
                    step: BuildStep::Package,
                    reason: "exit status: 1".to_string(),
                });
            }

            let dir = request.platform_dir(platform);
            tokio::fs::create_dir_all(&dir).await.unwrap();
            let mut artifacts = Vec::new();
            for &arch in target.architectures() {
                let name = self
                    .naming
                    .canonical_name(platform, arch, &request.product, &request.version)
                    .unwrap();
                let path = dir.join(&name);
                tokio::fs::write(&path, format!("{} {} {}", platform, arch, request.version))
                    .await
                    .unwrap();
                artifacts.push(ArtifactRef::from_path(&path).await.unwrap());
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(artifacts)
        }
    }

    #[derive(Clone, Default)]
    struct CountingPublisher {
        calls: Arc<AtomicUsize>,
    }

    impl Publisher for CountingPublisher {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn publish(&self, manifest: &ReleaseManifest, staging: &Path) -> Result<PublishReceipt, PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PublishReceipt {
                publisher: self.name(),
                destination: staging.display().to_string(),
                files: manifest.artifacts().iter().map(|a| a.file_name().to_string()).collect(),
                release_url: None,
            })
        }
    }

    #[derive(Clone, Default)]
    struct MockHost {
        drafts: Arc<Mutex<Vec<DraftRelease>>>,
        uploads: Arc<Mutex<Vec<String>>>,
        deleted: Arc<Mutex<Vec<u64>>>,
        /// 1-based index of the upload that fails
        fail_upload_at: Option<usize>,
    }

    impl ReleaseHost for MockHost {
        async fn verify_access(&self) -> Result<(), PublishError> {
            Ok(())
        }

        async fn create_draft_release(&self, draft: &DraftRelease) -> Result<CreatedRelease, PublishError> {
            self.drafts.lock().unwrap().push(draft.clone());
            Ok(CreatedRelease {
                id: 7,
                html_url: format!("https://example.invalid/releases/{}", draft.tag),
                draft: draft.draft,
            })
        }

        async fn upload_asset(
            &self,
            _release: &CreatedRelease,
            asset: &ReleaseAsset,
        ) -> Result<UploadedAsset, PublishError> {
            let size = std::fs::metadata(&asset.path).unwrap().len();
            let mut uploads = self.uploads.lock().unwrap();
            if self.fail_upload_at == Some(uploads.len() + 1) {
                return Err(PublishError::AssetUpload {
                    file_name: asset.file_name.clone(),
                    reason: "502 Bad Gateway".to_string(),
                });
            }
            uploads.push(asset.file_name.clone());
            Ok(UploadedAsset {
                file_name: asset.file_name.clone(),
                size,
                download_url: format!("https://example.invalid/download/{}", asset.file_name),
            })
        }

        async fn delete_release(&self, release: &CreatedRelease) -> Result<(), PublishError> {
            self.deleted.lock().unwrap().push(release.id);
            Ok(())
        }
    }

    /// Records stage transitions; optionally corrupts an artifact once checksums are written.
    #[derive(Default)]
    struct RecordingObserver {
        started: Mutex<Vec<PipelineStage>>,
        failed: Mutex<Option<PipelineStage>>,
        corrupt_after_hashing: bool,
    }

    impl StageObserver for RecordingObserver {
        fn stage_started(&self, stage: PipelineStage) {
            self.started.lock().unwrap().push(stage);
        }

        fn checksums_recorded(&self, manifest_path: &Path) {
            if self.corrupt_after_hashing {
                let victim = manifest_path.parent().unwrap().join("kodegen-2.3.0-x64.dmg");
                let mut content = std::fs::read(&victim).unwrap();
                content.extend_from_slice(b"truncated transfer");
                std::fs::write(&victim, content).unwrap();
            }
        }

        fn stage_failed(&self, failure: &kodegen_release_pipeline::pipeline::PipelineFailure) {
            *self.failed.lock().unwrap() = Some(failure.stage);
        }
    }

    fn settings(work_dir: &Path) -> PipelineSettings {
        PipelineSettings {
            product: "kodegen".to_string(),
            declared_version: "2.3.0".to_string(),
            work_dir: work_dir.to_path_buf(),
            build_timeout: Duration::from_secs(30),
            targets: BuildTarget::standard_set(),
        }
    }

    fn resolver() -> VersionResolver {
        VersionResolver::new("stable", "main")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 0).unwrap()
    }

    fn nightly_trigger() -> TriggerContext {
        TriggerContext::new(TriggerKind::Scheduled)
    }

    fn stable_trigger() -> TriggerContext {
        TriggerContext::new(TriggerKind::Push).with_ref("refs/heads/stable")
    }

    fn auxiliary(dir: &Path) -> AuxiliaryFiles {
        std::fs::create_dir_all(dir).unwrap();
        for name in ["index.html", "preview.png", "logo.svg"] {
            std::fs::write(dir.join(name), name).unwrap();
        }
        AuxiliaryFiles {
            landing_page: dir.join("index.html"),
            preview_image: dir.join("preview.png"),
            logo: dir.join("logo.svg"),
        }
    }

    fn counting_orchestrator(
        work_dir: &Path,
        builder: FakeBuilder,
    ) -> (
        ReleaseOrchestrator<FakeBuilder, CountingPublisher, CountingPublisher>,
        CountingPublisher,
        CountingPublisher,
    ) {
        let nightly = CountingPublisher::default();
        let release = CountingPublisher::default();
        let orchestrator = ReleaseOrchestrator::new(
            settings(work_dir),
            resolver(),
            builder,
            SigningCredentials::none(),
            ChannelPublishers::new(Some(nightly.clone()), Some(release.clone())),
        );
        (orchestrator, nightly, release)
    }

    fn sorted_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_nightly_run_mirrors_complete_release_set() {
        let tmp = tempfile::tempdir().unwrap();
        let work_dir = tmp.path().join("work");
        let remote = tmp.path().join("remote");

        // Leftovers from an earlier nightly, on both ends
        std::fs::create_dir_all(work_dir.join("staging")).unwrap();
        std::fs::write(work_dir.join("staging/leftover.tmp"), "old").unwrap();
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::write(remote.join("kodegen-2.2.0-nightly-20260101-0000-x64.exe"), "old").unwrap();

        let publisher = NightlyPublisher::new(LocalMirror::new(&remote), auxiliary(&tmp.path().join("site")));
        let orchestrator = ReleaseOrchestrator::new(
            settings(&work_dir),
            resolver(),
            FakeBuilder::default(),
            SigningCredentials::none(),
            ChannelPublishers::<_, CountingPublisher>::nightly_only(publisher),
        );

        let observer = RecordingObserver::default();
        let report = orchestrator.run(&nightly_trigger(), now(), &observer).await.unwrap();

        assert_eq!(report.release.version, "2.3.0-nightly-20260314-0926");
        assert_eq!(report.release.channel, ReleaseChannel::Nightly);
        assert_eq!(report.release.source_ref, "main");
        assert_eq!(
            report.stages,
            vec![
                PipelineStage::Resolving,
                PipelineStage::Building,
                PipelineStage::Aggregating,
                PipelineStage::Verifying,
                PipelineStage::Publishing,
            ]
        );
        assert_eq!(observer.started.lock().unwrap().last(), Some(&PipelineStage::Done));

        let mirrored = sorted_names(&remote);
        assert_eq!(mirrored.len(), 10, "6 installers, checksums and 3 auxiliary files: {:?}", mirrored);
        assert!(mirrored.contains(&CHECKSUM_FILE_NAME.to_string()));
        assert!(mirrored.contains(&"kodegen-2.3.0-nightly-20260314-0926-arm64.AppImage".to_string()));
        assert!(!mirrored.iter().any(|n| n.contains("2.2.0")));
        assert!(!mirrored.contains(&"leftover.tmp".to_string()));

        let entries = ChecksumVerifier::new(&remote).verify_listed().await.unwrap();
        assert_eq!(entries.len(), 6);
        assert!(entries.iter().all(|e| e.verified()));
    }

    #[tokio::test]
    async fn test_stable_run_creates_draft_with_every_asset() {
        let tmp = tempfile::tempdir().unwrap();
        let host = MockHost::default();
        let publisher = ReleasePublisher::new(
            host.clone(),
            ReleaseNotes::new(Some("Faster startup".to_string()), NotesPolicy::Require),
        );
        let orchestrator = ReleaseOrchestrator::new(
            settings(tmp.path()),
            resolver(),
            FakeBuilder::default(),
            SigningCredentials::none(),
            ChannelPublishers::<CountingPublisher, _>::release_only(publisher),
        );

        let report = orchestrator.run(&stable_trigger(), now(), &NoopObserver).await.unwrap();

        assert_eq!(report.release.version, "2.3.0");
        assert_eq!(report.release.tag(), "v2.3.0");

        let drafts = host.drafts.lock().unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].tag, "v2.3.0");
        assert!(drafts[0].draft);
        assert!(!drafts[0].prerelease);
        assert_eq!(drafts[0].target_commitish, "stable");
        assert_eq!(drafts[0].body, "Faster startup");

        let uploads = host.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 7);
        assert!(uploads.contains(&CHECKSUM_FILE_NAME.to_string()));
        assert!(uploads.contains(&"kodegen-2.3.0-x64.exe".to_string()));
        assert_eq!(
            report.receipt.release_url.as_deref(),
            Some("https://example.invalid/releases/v2.3.0")
        );
    }

    #[tokio::test]
    async fn test_failed_upload_deletes_the_draft() {
        let tmp = tempfile::tempdir().unwrap();
        let host = MockHost {
            fail_upload_at: Some(3),
            ..Default::default()
        };
        let publisher = ReleasePublisher::new(host.clone(), ReleaseNotes::default());
        let orchestrator = ReleaseOrchestrator::new(
            settings(tmp.path()),
            resolver(),
            FakeBuilder::default(),
            SigningCredentials::none(),
            ChannelPublishers::<CountingPublisher, _>::release_only(publisher),
        );

        let failure = orchestrator.run(&stable_trigger(), now(), &NoopObserver).await.unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Publishing);
        assert!(matches!(
            &failure.cause,
            ReleaseError::Publish(PublishError::AssetUpload { reason, .. }) if reason.contains("502")
        ));
        assert_eq!(host.drafts.lock().unwrap().len(), 1);
        assert_eq!(host.uploads.lock().unwrap().len(), 2);
        assert_eq!(*host.deleted.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_targets_sharing_a_platform_publish_every_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let mut split = settings(tmp.path());
        split.targets = vec![
            BuildTarget::new(Platform::Windows, [Arch::X64]),
            BuildTarget::new(Platform::Windows, [Arch::Arm64]),
            BuildTarget::new(Platform::MacOs, [Arch::X64]),
        ];
        let release = CountingPublisher::default();
        let orchestrator = ReleaseOrchestrator::new(
            split,
            resolver(),
            FakeBuilder::default(),
            SigningCredentials::none(),
            ChannelPublishers::<CountingPublisher, _>::release_only(release.clone()),
        );

        let report = orchestrator.run(&stable_trigger(), now(), &NoopObserver).await.unwrap();

        let mut files = report.receipt.files.clone();
        files.sort();
        assert_eq!(
            files,
            vec!["kodegen-2.3.0-arm64.exe", "kodegen-2.3.0-x64.dmg", "kodegen-2.3.0-x64.exe"]
        );
        assert_eq!(report.manifest.checksums().len(), 3);
        assert_eq!(release.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_builds_block_publication_after_all_builders_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = FakeBuilder::failing(&[Platform::Linux, Platform::Windows]);
        let finished = Arc::clone(&builder.finished);
        let (orchestrator, nightly, release) = counting_orchestrator(tmp.path(), builder);

        let observer = RecordingObserver::default();
        let failure = orchestrator.run(&nightly_trigger(), now(), &observer).await.unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Building);
        assert_eq!(*observer.failed.lock().unwrap(), Some(PipelineStage::Building));
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        match &failure.cause {
            ReleaseError::Coordinator(err) => {
                assert_eq!(err.total, 3);
                let platforms: Vec<Platform> = err.failures.iter().map(BuildError::platform).collect();
                assert_eq!(platforms, vec![Platform::Windows, Platform::Linux]);
            }
            other => panic!("unexpected cause {:?}", other),
        }
        assert!(failure.to_string().starts_with("Building stage failed:"));
        assert_eq!(nightly.calls.load(Ordering::SeqCst), 0);
        assert_eq!(release.calls.load(Ordering::SeqCst), 0);
        assert!(!tmp.path().join("staging").exists());
    }

    #[tokio::test]
    async fn test_name_collision_aborts_before_publication() {
        let tmp = tempfile::tempdir().unwrap();
        let mut naming = NamingTable::standard();
        naming.set_rule(Platform::Linux, Arch::X64, NamingRule::new("{{product}}.bin", "exe"));
        let builder = FakeBuilder {
            naming,
            ..Default::default()
        };
        let (orchestrator, nightly, _release) = counting_orchestrator(tmp.path(), builder);

        let failure = orchestrator.run(&nightly_trigger(), now(), &NoopObserver).await.unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Aggregating);
        assert!(matches!(
            &failure.cause,
            ReleaseError::Aggregate(AggregateError::NameCollision { file_name, .. })
                if file_name == "kodegen-2.3.0-nightly-20260314-0926-x64.exe"
        ));
        assert_eq!(nightly.calls.load(Ordering::SeqCst), 0);
        assert_eq!(sorted_names(&tmp.path().join("staging")), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_artifact_changed_after_hashing_fails_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let (orchestrator, _nightly, release) = counting_orchestrator(tmp.path(), FakeBuilder::default());
        let observer = RecordingObserver {
            corrupt_after_hashing: true,
            ..Default::default()
        };

        let failure = orchestrator.run(&stable_trigger(), now(), &observer).await.unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Verifying);
        assert!(matches!(
            &failure.cause,
            ReleaseError::Checksum(ChecksumError::Mismatch { file_name, .. }) if file_name == "kodegen-2.3.0-x64.dmg"
        ));
        assert_eq!(release.calls.load(Ordering::SeqCst), 0);
        assert!(!observer.started.lock().unwrap().contains(&PipelineStage::Publishing));
    }

    #[tokio::test]
    async fn test_unrecognized_trigger_builds_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = FakeBuilder::default();
        let launched = Arc::clone(&builder.launched);
        let (orchestrator, nightly, release) = counting_orchestrator(tmp.path(), builder);

        let push_elsewhere = TriggerContext::new(TriggerKind::Push).with_ref("refs/heads/feature/x");
        for trigger in [TriggerContext::default(), push_elsewhere] {
            let failure = orchestrator.run(&trigger, now(), &NoopObserver).await.unwrap_err();
            assert_eq!(failure.stage, PipelineStage::Resolving);
        }

        assert_eq!(launched.load(Ordering::SeqCst), 0);
        assert_eq!(nightly.calls.load(Ordering::SeqCst) + release.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_channel_without_publisher_fails_before_building() {
        let tmp = tempfile::tempdir().unwrap();
        let builder = FakeBuilder::default();
        let launched = Arc::clone(&builder.launched);
        let orchestrator = ReleaseOrchestrator::new(
            settings(tmp.path()),
            resolver(),
            builder,
            SigningCredentials::none(),
            ChannelPublishers::<CountingPublisher, CountingPublisher>::nightly_only(CountingPublisher::default()),
        );

        let failure = orchestrator.run(&stable_trigger(), now(), &NoopObserver).await.unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Resolving);
        assert!(matches!(
            failure.cause,
            ReleaseError::Publish(PublishError::PreconditionFailed { .. })
        ));
        assert_eq!(launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_manual_stable_request_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (orchestrator, nightly, release) = counting_orchestrator(tmp.path(), FakeBuilder::default());
        let trigger = TriggerContext::new(TriggerKind::Manual).with_hint(ReleaseChannel::Stable);

        let failure = orchestrator.run(&trigger, now(), &NoopObserver).await.unwrap_err();

        assert_eq!(failure.stage, PipelineStage::Resolving);
        assert_eq!(nightly.calls.load(Ordering::SeqCst) + release.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exactly_one_publisher_runs_per_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let (orchestrator, nightly, release) = counting_orchestrator(tmp.path(), FakeBuilder::default());

        let report = orchestrator.run(&nightly_trigger(), now(), &NoopObserver).await.unwrap();
        assert_eq!(report.receipt.publisher, "counting");
        assert_eq!(report.receipt.files.len(), 6);
        assert_eq!((nightly.calls.load(Ordering::SeqCst), release.calls.load(Ordering::SeqCst)), (1, 0));

        orchestrator.run(&stable_trigger(), now(), &NoopObserver).await.unwrap();
        assert_eq!((nightly.calls.load(Ordering::SeqCst), release.calls.load(Ordering::SeqCst)), (1, 1));

        let staged: Vec<PathBuf> = report.manifest.artifacts().iter().map(|a| a.source_path().to_path_buf()).collect();
        assert!(staged.iter().all(|p| p.starts_with(tmp.path().join("staging"))));
    }
}
