#![allow(unused_imports)]

use chat_sync::{
    init_logging, serve_connection, ApplicationSnapshot, AuthCredentials, ChannelError, ChannelId,
    Coordinator, CoordinatorStore, CredentialExposure, CredentialState, EnvConfig, ErrorKind,
    FetchedState, FrameReader, InboundLine, MirrorConfig, MirrorState, MirrorStore,
    PartialSnapshot, Request, RequestRouter, Response, StoreEvent, StorePhase, Subscription,
    SyncBroadcaster, SyncConfig, WireError, DEFAULT_FETCH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    MAX_FRAME_BYTES,
};

#[test]
fn public_api_exports_compile() {}
