mod sequencer;
